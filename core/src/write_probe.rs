//! Write-access probes.
//!
//! A coil write that goes through means the relay can be actuated remotely.
//! A register write that goes through means a write path exists that the
//! device should not expose. A refusal is the expected result and is still
//! reported, so the report shows what was checked.

use std::fmt;

use tokio_util::sync::CancellationToken;

use relayprobe_common::config::WriteProbeConfig;
use relayprobe_common::error::ScanError;
use relayprobe_common::report::EventLog;
use relayprobe_common::report::finding::{AnomalyFinding, FindingKind, Severity};
use relayprobe_common::report::reading::{AddressRange, DataClass};

use crate::network::{RegisterChannel, cancellable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    Coil(u16),
    Register { address: u16, value: u16 },
}

impl ProbeTarget {
    pub fn class(&self) -> DataClass {
        match self {
            ProbeTarget::Coil(_) => DataClass::Coil,
            ProbeTarget::Register { .. } => DataClass::HoldingRegister,
        }
    }

    pub fn address(&self) -> u16 {
        match *self {
            ProbeTarget::Coil(address) | ProbeTarget::Register { address, .. } => address,
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeTarget::Coil(address) => write!(f, "coil {address}"),
            ProbeTarget::Register { address, value } => write!(f, "register {address} <- {value}"),
        }
    }
}

/// Candidates in probe order: coils first, then registers.
pub fn probe_targets(cfg: &WriteProbeConfig) -> Vec<ProbeTarget> {
    cfg.coils
        .iter()
        .map(|&address| ProbeTarget::Coil(address))
        .chain(cfg.registers.iter().map(|&address| ProbeTarget::Register {
            address,
            value: cfg.sentinel,
        }))
        .collect()
}

/// Turns the device's answer to one probe into a finding.
pub fn classify(
    target: ProbeTarget,
    outcome: Result<(), ScanError>,
    timeouts_are_rejections: bool,
) -> AnomalyFinding {
    let (kind, severity, detail) = match outcome {
        Ok(()) => match target {
            ProbeTarget::Coil(_) => (
                FindingKind::WriteAccepted,
                Severity::Critical,
                format!("{target} accepted a write; remote actuation possible"),
            ),
            ProbeTarget::Register { .. } => (
                FindingKind::IllegalWriteAccepted,
                Severity::Warn,
                format!("{target} accepted a write to a protected address"),
            ),
        },
        Err(e) if e.is_protocol() || (e.is_timeout() && timeouts_are_rejections) => (
            FindingKind::WriteRejected,
            Severity::Pass,
            format!("{target} write blocked as expected ({e})"),
        ),
        Err(e) => (
            FindingKind::WriteInconclusive,
            Severity::Info,
            format!("{target} could not be tested: {e}"),
        ),
    };

    AnomalyFinding::new(
        target.class(),
        AddressRange::single(target.address()),
        kind,
        severity,
        detail,
    )
}

/// Records every candidate as not attempted.
pub fn dry_run(cfg: &WriteProbeConfig, log: &mut EventLog) -> Vec<AnomalyFinding> {
    log.info("dry run, no writes sent");
    probe_targets(cfg)
        .into_iter()
        .map(|target| {
            AnomalyFinding::new(
                target.class(),
                AddressRange::single(target.address()),
                FindingKind::WriteSkipped,
                Severity::Info,
                format!("{target} not written (dry run)"),
            )
        })
        .collect()
}

async fn write(channel: &mut dyn RegisterChannel, target: ProbeTarget) -> Result<(), ScanError> {
    match target {
        ProbeTarget::Coil(address) => channel.write_single_coil(address, true).await,
        ProbeTarget::Register { address, value } => {
            channel.write_single_register(address, value).await
        }
    }
}

/// Sends one write per candidate on an open session.
///
/// Stops early only on cancellation; findings for the probes already sent
/// are returned together with the error.
pub async fn probe(
    channel: &mut dyn RegisterChannel,
    cfg: &WriteProbeConfig,
    log: &mut EventLog,
    cancel: &CancellationToken,
) -> (Vec<AnomalyFinding>, Option<ScanError>) {
    let mut findings = Vec::new();

    for target in probe_targets(cfg) {
        let outcome = match cancellable(cancel, write(channel, target)).await {
            Err(ScanError::Cancelled) => {
                log.warn(format!("write probes cancelled before {target}"));
                return (findings, Some(ScanError::Cancelled));
            }
            outcome => outcome,
        };

        let finding = classify(target, outcome, cfg.timeouts_are_rejections);
        match finding.severity {
            Severity::Critical => log.error(finding.detail.clone()),
            Severity::Warn => log.warn(finding.detail.clone()),
            _ => log.info(finding.detail.clone()),
        }
        findings.push(finding);
    }

    (findings, None)
}
