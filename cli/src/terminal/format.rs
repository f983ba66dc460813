use crate::terminal::colors;
use colored::*;

use relayprobe_common::report::SectionStatus;
use relayprobe_common::report::escalation::AttemptStatus;
use relayprobe_common::report::finding::Severity;
use relayprobe_common::report::reading::{BitReading, BitState, DecodedValue, RegisterReading};

type Detail = (String, ColoredString);

pub fn severity(severity: Severity) -> ColoredString {
    let text = severity.to_string();
    match severity {
        Severity::Pass => text.color(colors::PASS).bold(),
        Severity::Info => text.color(colors::INFO),
        Severity::Warn => text.color(colors::WARN).bold(),
        Severity::Critical => text.color(colors::CRITICAL).bold().reversed(),
    }
}

pub fn attempt_status(status: AttemptStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        AttemptStatus::Success => text.color(colors::CRITICAL).bold(),
        AttemptStatus::Failed => text.color(colors::PASS),
        AttemptStatus::Skipped => text.dimmed(),
        AttemptStatus::Pending => text.color(colors::SEPARATOR),
    }
}

pub fn section_status(status: &SectionStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        SectionStatus::Completed => text.color(colors::PASS),
        SectionStatus::Skipped(_) => text.dimmed(),
        SectionStatus::Failed(_) => text.color(colors::CRITICAL),
        SectionStatus::Cancelled => text.color(colors::WARN),
    }
}

pub fn register_details(readings: &[RegisterReading]) -> Vec<Detail> {
    readings
        .iter()
        .map(|r| {
            let value = match r.value {
                DecodedValue::Scaled { .. } => format!("{} (raw {})", r.value, r.raw),
                DecodedValue::Raw { .. } => r.value.to_string(),
            };
            (r.display_label(), value.color(colors::VALUE))
        })
        .collect()
}

pub fn bit_details(readings: &[BitReading]) -> Vec<Detail> {
    readings
        .iter()
        .map(|b| {
            let state = match b.state {
                BitState::On => "ON".color(colors::ACCENT).bold(),
                BitState::Off => "OFF".dimmed(),
            };
            (b.display_label(), state)
        })
        .collect()
}
