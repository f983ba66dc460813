use std::fmt;

use serde::{Deserialize, Serialize};

use super::reading::{AddressRange, DataClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    /// A whole read batch returned one identical value.
    RepeatedValue,
    /// A coil write was accepted.
    WriteAccepted,
    /// A write to a register that should be read-only was accepted.
    IllegalWriteAccepted,
    /// A write probe was refused by the device.
    WriteRejected,
    /// A write probe was not sent because the scan ran dry.
    WriteSkipped,
    /// The transport failed before the device answered a write probe.
    WriteInconclusive,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindingKind::RepeatedValue => "REPEATED_VALUE",
            FindingKind::WriteAccepted => "WRITE_ACCEPTED",
            FindingKind::IllegalWriteAccepted => "ILLEGAL_WRITE_ACCEPTED",
            FindingKind::WriteRejected => "WRITE_REJECTED",
            FindingKind::WriteSkipped => "WRITE_SKIPPED",
            FindingKind::WriteInconclusive => "WRITE_INCONCLUSIVE",
        };
        f.write_str(s)
    }
}

/// Ordered from least to most severe; `Pass` records an expected-good result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Pass,
    Info,
    Warn,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Pass => "PASS",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyFinding {
    pub class: DataClass,
    pub range: AddressRange,
    pub kind: FindingKind,
    pub severity: Severity,
    pub detail: String,
}

impl AnomalyFinding {
    pub fn new(
        class: DataClass,
        range: AddressRange,
        kind: FindingKind,
        severity: Severity,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            class,
            range,
            kind,
            severity,
            detail: detail.into(),
        }
    }
}
