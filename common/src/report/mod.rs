//! # Scan Report Model
//!
//! Everything a scan of one relay produces. Components fill in their own
//! piece ([`SectionOutcome`]) and the aggregator in `relayprobe-core` merges
//! them into a [`ScanReport`]; nothing downstream reclassifies a result.

pub mod escalation;
pub mod fingerprint;
pub mod finding;
pub mod reading;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::network::target::Target;
use escalation::{AttemptStatus, EscalationAttempt};
use fingerprint::FingerprintRecord;
use finding::{AnomalyFinding, Severity};
use reading::{BitReading, RegisterReading, UnreadableRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Fingerprint,
    Escalation,
    Enumeration,
    WriteProbe,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Subsystem::Fingerprint => "fingerprint",
            Subsystem::Escalation => "escalation",
            Subsystem::Enumeration => "enumeration",
            Subsystem::WriteProbe => "write-probe",
        };
        f.write_str(s)
    }
}

/// How a subsystem ended. A section that was attempted always carries one of
/// these, so a report never silently omits a failed section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SectionStatus {
    Completed,
    Failed(String),
    Skipped(String),
    Cancelled,
}

impl SectionStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, SectionStatus::Completed)
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionStatus::Completed => f.write_str("completed"),
            SectionStatus::Failed(reason) => write!(f, "failed: {reason}"),
            SectionStatus::Skipped(reason) => write!(f, "skipped: {reason}"),
            SectionStatus::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub timestamp: DateTime<Utc>,
    pub subsystem: Subsystem,
    pub level: EventLevel,
    pub message: String,
}

/// Append-only event log owned by one component run.
///
/// Every entry is mirrored to `tracing` with the target host attached.
#[derive(Debug, Clone)]
pub struct EventLog {
    host: String,
    subsystem: Subsystem,
    events: Vec<ScanEvent>,
}

impl EventLog {
    pub fn new(host: impl Into<String>, subsystem: Subsystem) -> Self {
        Self {
            host: host.into(),
            subsystem,
            events: Vec::new(),
        }
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.record(EventLevel::Debug, message.into());
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(EventLevel::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(EventLevel::Warn, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(EventLevel::Error, message.into());
    }

    fn record(&mut self, level: EventLevel, message: String) {
        let host = self.host.as_str();
        let subsystem = self.subsystem;
        match level {
            EventLevel::Debug => tracing::debug!(%host, %subsystem, "{message}"),
            EventLevel::Info => tracing::info!(%host, %subsystem, "{message}"),
            EventLevel::Warn => tracing::warn!(%host, %subsystem, "{message}"),
            EventLevel::Error => tracing::error!(%host, %subsystem, "{message}"),
        }
        self.events.push(ScanEvent {
            timestamp: Utc::now(),
            subsystem,
            level,
            message,
        });
    }

    pub fn into_events(self) -> Vec<ScanEvent> {
        self.events
    }
}

/// Result of one component run: its data, how it ended, and what it logged.
#[derive(Debug, Clone)]
pub struct SectionOutcome<T> {
    pub status: SectionStatus,
    pub data: T,
    pub events: Vec<ScanEvent>,
}

impl<T> SectionOutcome<T> {
    pub fn new(status: SectionStatus, data: T, log: EventLog) -> Self {
        Self {
            status,
            data,
            events: log.into_events(),
        }
    }
}

/// Readings and findings of the Modbus enumeration sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumerationResult {
    pub holding_registers: Vec<RegisterReading>,
    pub input_registers: Vec<RegisterReading>,
    pub coils: Vec<BitReading>,
    pub discrete_inputs: Vec<BitReading>,
    pub unreadable: Vec<UnreadableRange>,
    pub findings: Vec<AnomalyFinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionStatuses {
    pub fingerprint: SectionStatus,
    pub escalation: SectionStatus,
    pub enumeration: SectionStatus,
    pub write_probe: SectionStatus,
}

impl SectionStatuses {
    pub fn iter(&self) -> impl Iterator<Item = (Subsystem, &SectionStatus)> {
        [
            (Subsystem::Fingerprint, &self.fingerprint),
            (Subsystem::Escalation, &self.escalation),
            (Subsystem::Enumeration, &self.enumeration),
            (Subsystem::WriteProbe, &self.write_probe),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub target: Target,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sections: SectionStatuses,
    pub fingerprint: FingerprintRecord,
    pub escalation: Vec<EscalationAttempt>,
    pub holding_registers: Vec<RegisterReading>,
    pub input_registers: Vec<RegisterReading>,
    pub coils: Vec<BitReading>,
    pub discrete_inputs: Vec<BitReading>,
    pub unreadable: Vec<UnreadableRange>,
    pub findings: Vec<AnomalyFinding>,
    pub events: Vec<ScanEvent>,
}

impl ScanReport {
    /// Model string used to key CVE correlation.
    pub fn model(&self) -> Option<&str> {
        self.fingerprint.model.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.fingerprint.version.as_deref()
    }

    pub fn worst_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }

    pub fn granted_roles(&self) -> Vec<&str> {
        self.escalation
            .iter()
            .filter(|a| a.status == AttemptStatus::Success)
            .map(|a| a.role.as_str())
            .collect()
    }

    pub fn failed_sections(&self) -> Vec<(Subsystem, &SectionStatus)> {
        self.sections
            .iter()
            .filter(|(_, status)| matches!(status, SectionStatus::Failed(_) | SectionStatus::Cancelled))
            .collect()
    }
}
