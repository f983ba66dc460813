//! Scan orchestration.
//!
//! One target is scanned by three concurrent branches: fingerprint and
//! escalation each on their own Telnet session, and the Modbus branch, which
//! runs the register sweep and then the write probes on a single Modbus
//! session. Branches never share a session, and a failed branch does not
//! stop the others: its section is marked failed and the report is still
//! produced.
//!
//! Many targets are scanned through a bounded worker pool. Reports come back
//! in the order the targets were given.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use relayprobe_common::config::ScanConfig;
use relayprobe_common::error::ScanError;
use relayprobe_common::network::target::Target;
use relayprobe_common::report::finding::AnomalyFinding;
use relayprobe_common::report::{
    EnumerationResult, EventLog, ScanReport, SectionOutcome, SectionStatus, Subsystem,
};
use relayprobe_common::{error, info, success, warn};

use crate::escalation::{self, EscalationUpdate};
use crate::network::{Connector, TcpConnector, cancellable};
use crate::report::{self, ComponentOutputs};
use crate::{enumeration, fingerprint, write_probe};

type ModbusOutcomes = (
    SectionOutcome<EnumerationResult>,
    SectionOutcome<Vec<AnomalyFinding>>,
);

#[derive(Clone)]
pub struct Scanner {
    cfg: Arc<ScanConfig>,
    connector: Arc<dyn Connector>,
    assumed: Option<(Option<String>, Option<String>)>,
    progress: Option<UnboundedSender<EscalationUpdate>>,
}

impl Scanner {
    /// Validates `cfg` and builds a scanner over real TCP sessions.
    pub fn new(cfg: ScanConfig) -> Result<Self, ScanError> {
        cfg.validate()?;
        Ok(Self {
            cfg: Arc::new(cfg),
            connector: Arc::new(TcpConnector),
            assumed: None,
            progress: None,
        })
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Skips the fingerprint probe and reports this identity instead.
    pub fn with_assumed_identity(mut self, model: Option<String>, version: Option<String>) -> Self {
        if model.is_some() || version.is_some() {
            self.assumed = Some((model, version));
        }
        self
    }

    pub fn with_progress(mut self, tx: UnboundedSender<EscalationUpdate>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Scans one target. Always returns a report; failed or cancelled
    /// sections are marked as such.
    pub async fn scan_target(&self, target: &Target, cancel: &CancellationToken) -> ScanReport {
        let started_at = Utc::now();
        let connector = self.connector.as_ref();
        let cfg = self.cfg.as_ref();
        info!(host = %target, "scan started");

        let fingerprint = async {
            match &self.assumed {
                Some((model, version)) => {
                    fingerprint::assumed(target, model.clone(), version.clone())
                }
                None => fingerprint::run(connector, target, cfg, cancel).await,
            }
        };
        let escalation = escalation::run(connector, target, cfg, cancel, self.progress.as_ref());
        let modbus = run_modbus(connector, target, cfg, cancel);

        let (fingerprint, escalation, (enumeration, write_probe)) =
            tokio::join!(fingerprint, escalation, modbus);

        let report = report::assemble(
            target.clone(),
            started_at,
            Utc::now(),
            ComponentOutputs {
                fingerprint,
                escalation,
                enumeration,
                write_probe,
            },
        );

        let failed = report.failed_sections().len();
        if failed == 0 {
            success!(host = %target, "scan finished");
        } else {
            warn!(host = %target, failed, "scan finished with incomplete sections");
        }
        report
    }

    /// Scans every target with at most `workers` in flight.
    pub async fn scan_all(&self, targets: Vec<Target>, cancel: CancellationToken) -> Vec<ScanReport> {
        let permits = Arc::new(Semaphore::new(self.cfg.workers));
        let mut tasks = JoinSet::new();

        for (idx, target) in targets.iter().cloned().enumerate() {
            let scanner = self.clone();
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = permits.acquire_owned() => permit.ok(),
                };
                let report = match permit {
                    Some(_permit) => scanner.scan_target(&target, &cancel).await,
                    None => not_run(target, SectionStatus::Cancelled),
                };
                (idx, report)
            });
        }

        let mut slots: Vec<Option<ScanReport>> = targets.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, report)) => slots[idx] = Some(report),
                Err(e) => error!("scan task did not complete: {e}"),
            }
        }

        slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| {
                    not_run(target, SectionStatus::Failed("scan task aborted".into()))
                })
            })
            .collect()
    }
}

fn not_run(target: Target, status: SectionStatus) -> ScanReport {
    let now = Utc::now();
    report::assemble(target, now, now, ComponentOutputs::not_run(status))
}

fn status_after(stopped: Option<&ScanError>) -> SectionStatus {
    match stopped {
        None => SectionStatus::Completed,
        Some(ScanError::Cancelled) => SectionStatus::Cancelled,
        Some(e) => SectionStatus::Failed(e.to_string()),
    }
}

fn dry_run_outcome(cfg: &ScanConfig, mut log: EventLog) -> SectionOutcome<Vec<AnomalyFinding>> {
    let findings = write_probe::dry_run(&cfg.write_probe, &mut log);
    SectionOutcome::new(SectionStatus::Skipped("dry run".into()), findings, log)
}

/// Register sweep, then write probes, on one Modbus session.
async fn run_modbus(
    connector: &dyn Connector,
    target: &Target,
    cfg: &ScanConfig,
    cancel: &CancellationToken,
) -> ModbusOutcomes {
    let mut sweep_log = EventLog::new(&target.host, Subsystem::Enumeration);
    let mut probe_log = EventLog::new(&target.host, Subsystem::WriteProbe);

    let mut channel = match cancellable(cancel, connector.open_modbus(target, cfg)).await {
        Ok(channel) => channel,
        Err(e) => {
            let status = status_after(Some(&e));
            if !matches!(e, ScanError::Cancelled) {
                sweep_log.error(format!("enumeration failed: {e}"));
            }
            let write_probe = if cfg.write_probe.dry_run {
                dry_run_outcome(cfg, probe_log)
            } else {
                probe_log.error(format!("write probes not sent: {e}"));
                SectionOutcome::new(status.clone(), Vec::new(), probe_log)
            };
            let enumeration = SectionOutcome::new(status, EnumerationResult::default(), sweep_log);
            return (enumeration, write_probe);
        }
    };

    let (data, stopped) =
        enumeration::sweep(channel.as_mut(), &cfg.enumeration, &mut sweep_log, cancel).await;
    let sweep_cancelled = matches!(stopped, Some(ScanError::Cancelled));
    let enumeration = SectionOutcome::new(status_after(stopped.as_ref()), data, sweep_log);

    let write_probe = if cfg.write_probe.dry_run {
        dry_run_outcome(cfg, probe_log)
    } else if sweep_cancelled {
        SectionOutcome::new(SectionStatus::Cancelled, Vec::new(), probe_log)
    } else {
        let (findings, stopped) =
            write_probe::probe(channel.as_mut(), &cfg.write_probe, &mut probe_log, cancel).await;
        SectionOutcome::new(status_after(stopped.as_ref()), findings, probe_log)
    };

    channel.close().await;
    (enumeration, write_probe)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
