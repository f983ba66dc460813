pub mod map;
pub mod scan;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use relayprobe_common::network::target::{DEFAULT_MODBUS_PORT, DEFAULT_TELNET_PORT, TargetExpr};

#[derive(Parser)]
#[command(name = "relayprobe")]
#[command(about = "Security assessment of protective relays over Telnet and Modbus/TCP.")]
#[command(version)]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log detail (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Reduce output (-q hides progress, -qq prints only the summary)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan one or more relays
    #[command(alias = "s")]
    Scan(ScanArgs),
    /// Show the register label map in use
    #[command(alias = "m")]
    Map,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Host, IPv4 range (10.0.0.1-20), CIDR block, or a comma separated list
    pub target: TargetExpr,

    #[arg(long, default_value_t = DEFAULT_TELNET_PORT)]
    pub telnet_port: u16,

    #[arg(long, default_value_t = DEFAULT_MODBUS_PORT)]
    pub modbus_port: u16,

    /// Send the write probes instead of recording them as skipped
    #[arg(long)]
    pub allow_writes: bool,

    /// Report unlabeled addresses under a generic name
    #[arg(long)]
    pub verbose_labels: bool,

    /// Relays scanned at the same time
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Also write the reports as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,

    /// Skip fingerprinting and assume this model
    #[arg(long)]
    pub assume_model: Option<String>,

    /// Skip fingerprinting and assume this firmware version
    #[arg(long)]
    pub assume_version: Option<String>,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
