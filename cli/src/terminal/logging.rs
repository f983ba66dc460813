use std::fmt;

use colored::*;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::{self, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent};
use tracing_subscriber::registry::LookupSpan;

use super::print::PRINT_TARGET;

/// Overrides the verbosity flags when set, e.g. `RELAYPROBE_LOG=relayprobe_core=trace`.
pub const LOG_ENV: &str = "RELAYPROBE_LOG";

pub fn init(verbose: u8, quiet: u8) {
    let level = match (quiet, verbose) {
        (q, _) if q > 0 => "warn",
        (_, 0) => "info",
        (_, 1) => "debug",
        _ => "trace",
    };

    // report output always goes through, whatever the verbosity
    let mut filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level));
    if let Ok(directive) = format!("{PRINT_TARGET}=info").parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(RelayFormatter)
        .init();
}

#[derive(Default)]
struct EventFields {
    message: Option<String>,
    raw_msg: Option<String>,
    status: Option<String>,
    extra: Vec<(&'static str, String)>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "raw_msg" => self.raw_msg = Some(value.to_string()),
            "status" => self.status = Some(value.to_string()),
            name => self.extra.push((name, value.to_string())),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{value:?}")),
            name => self.extra.push((name, format!("{value:?}"))),
        }
    }
}

pub struct RelayFormatter;

impl<S, N> FormatEvent<S, N> for RelayFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> format::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let mut fields = EventFields::default();
        event.record(&mut fields);

        if meta.target() == PRINT_TARGET {
            return writeln!(writer, "{}", fields.raw_msg.unwrap_or_default());
        }

        let success = fields.status.as_deref() == Some("success");
        let (symbol, color_func): (&str, fn(ColoredString) -> ColoredString) = match *meta.level() {
            Level::TRACE => ("[ ]", |s| s.dimmed()),
            Level::DEBUG => ("[?]", |s| s.blue()),
            Level::INFO if success => ("[+]", |s| s.green().bold()),
            Level::INFO => ("[*]", |s| s.cyan()),
            Level::WARN => ("[!]", |s| s.yellow().bold()),
            Level::ERROR => ("[-]", |s| s.red().bold()),
        };

        write!(writer, "{} ", color_func(symbol.into()))?;
        write!(writer, "{}", fields.message.unwrap_or_default())?;

        for (name, value) in &fields.extra {
            write!(writer, " {}", format!("{name}={value}").dimmed())?;
        }

        writeln!(writer)
    }
}
