mod commands;
mod terminal;

use commands::{CommandLine, Commands, map, scan};
use relayprobe_common::config::ScanConfig;
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init(commands.verbose, commands.quiet);
    print::banner(commands.quiet);

    let cfg = match &commands.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };

    match commands.command {
        Commands::Scan(args) => {
            print::header("starting relay scan", commands.quiet);
            scan::scan(args, cfg, commands.quiet).await
        }
        Commands::Map => {
            print::header("register label map", commands.quiet);
            map::map(&cfg);
            Ok(())
        }
    }
}
