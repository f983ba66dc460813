use std::time::Duration;

use relayprobe_common::config::{ScanConfig, TimingConfig};
use relayprobe_common::report::SectionStatus;
use relayprobe_common::report::escalation::AttemptStatus;
use relayprobe_common::report::finding::{FindingKind, Severity};
use relayprobe_common::report::reading::{BitState, DecodedValue};
use relayprobe_core::Scanner;
use tokio_util::sync::CancellationToken;

use crate::fake::{FakeRelay, RelayProfile};

fn fast_config() -> ScanConfig {
    ScanConfig {
        timing: TimingConfig {
            connect_timeout_ms: 1_000,
            io_timeout_ms: 300,
            fingerprint_wait_ms: 100,
            role_wait_ms: 60,
            password_wait_ms: 100,
            step_pause_ms: 10,
        },
        ..ScanConfig::default()
    }
}

/// A relay with factory ACC credentials: identity, access ladder and the
/// register image all come back, and nothing is written.
#[tokio::test]
async fn full_scan_of_loopback_relay() -> anyhow::Result<()> {
    let relay = FakeRelay::start(RelayProfile::sel_787()).await?;
    let scanner = Scanner::new(fast_config())?;

    let report = scanner
        .scan_target(&relay.target(), &CancellationToken::new())
        .await;

    assert_eq!(report.model(), Some("SEL-787"));
    assert_eq!(report.version(), Some("R110-V1"));
    assert_eq!(report.fingerprint.get("DEVID"), Some("FEEDER 7 XFMR"));

    let statuses: Vec<AttemptStatus> = report.escalation.iter().map(|a| a.status).collect();
    assert_eq!(
        statuses,
        vec![AttemptStatus::Success, AttemptStatus::Failed, AttemptStatus::Skipped]
    );
    assert_eq!(report.granted_roles(), vec!["ACC"]);

    let iaw1 = report
        .holding_registers
        .iter()
        .find(|r| r.label.as_deref() == Some("IAW1_MAG"))
        .ok_or_else(|| anyhow::anyhow!("IAW1_MAG missing"))?;
    assert_eq!(iaw1.raw, 1200);
    assert!(matches!(iaw1.value, DecodedValue::Scaled { value, .. } if (value - 120.0).abs() < 1e-9));

    let freq = report
        .holding_registers
        .iter()
        .find(|r| r.label.as_deref() == Some("FREQ"))
        .ok_or_else(|| anyhow::anyhow!("FREQ missing"))?;
    assert_eq!(freq.value.to_string(), "60.00");

    // strict labels: only the 32 labelled holding registers are reported
    assert_eq!(report.holding_registers.len(), 32);
    assert_eq!(report.input_registers.len(), 6);
    assert_eq!(report.coils.len(), 11);
    let trip = report
        .discrete_inputs
        .iter()
        .find(|b| b.label.as_deref() == Some("TRIP"))
        .ok_or_else(|| anyhow::anyhow!("TRIP missing"))?;
    assert_eq!(trip.state, BitState::On);

    assert!(report.unreadable.is_empty());
    assert!(report.findings.iter().all(|f| f.kind == FindingKind::WriteSkipped));
    assert_eq!(report.sections.write_probe, SectionStatus::Skipped("dry run".into()));
    assert!(report.failed_sections().is_empty());
    assert!(relay.writes().is_empty());
    Ok(())
}

#[tokio::test]
async fn closed_modbus_port_keeps_telnet_results() -> anyhow::Result<()> {
    let relay = FakeRelay::start(RelayProfile::sel_787()).await?;
    let target = relay.target_without_modbus().await?;
    let scanner = Scanner::new(fast_config())?;

    let report = scanner.scan_target(&target, &CancellationToken::new()).await;

    assert_eq!(report.sections.fingerprint, SectionStatus::Completed);
    assert_eq!(report.sections.escalation, SectionStatus::Completed);
    assert!(matches!(report.sections.enumeration, SectionStatus::Failed(_)));
    assert_eq!(report.model(), Some("SEL-787"));
    assert!(report.holding_registers.is_empty());
    assert!(
        report
            .events
            .iter()
            .any(|e| e.message.starts_with("enumeration failed"))
    );
    Ok(())
}

#[tokio::test]
async fn live_probes_flag_the_coil_the_relay_accepts() -> anyhow::Result<()> {
    let relay = FakeRelay::start(RelayProfile::sel_787().accepting_coils(&[100])).await?;
    let mut cfg = fast_config();
    cfg.write_probe.dry_run = false;
    let scanner = Scanner::new(cfg)?;

    let report = scanner
        .scan_target(&relay.target(), &CancellationToken::new())
        .await;

    assert_eq!(report.sections.write_probe, SectionStatus::Completed);
    let probe_results: Vec<(FindingKind, Severity, u16)> = report
        .findings
        .iter()
        .map(|f| (f.kind, f.severity, f.range.start))
        .collect();
    assert_eq!(
        probe_results,
        vec![
            (FindingKind::WriteAccepted, Severity::Critical, 100),
            (FindingKind::WriteRejected, Severity::Pass, 101),
            (FindingKind::WriteRejected, Severity::Pass, 4000),
            (FindingKind::WriteRejected, Severity::Pass, 4001),
        ]
    );
    assert_eq!(relay.writes(), vec![(0x05, 100, 0xFF00)]);
    Ok(())
}

#[tokio::test]
async fn interrupted_scan_reports_cancelled_ladder() -> anyhow::Result<()> {
    let relay = FakeRelay::start(RelayProfile::sel_787()).await?;
    let mut cfg = fast_config();
    cfg.timing.step_pause_ms = 2_000;
    let scanner = Scanner::new(cfg)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        scanner.scan_target(&relay.target(), &cancel),
    )
    .await?;

    assert_eq!(report.sections.escalation, SectionStatus::Cancelled);
    assert!(
        report
            .escalation
            .iter()
            .all(|a| a.status == AttemptStatus::Skipped)
    );
    assert_eq!(report.escalation.len(), 3);
    Ok(())
}

#[tokio::test]
async fn reports_follow_target_order() -> anyhow::Result<()> {
    let first = FakeRelay::start(RelayProfile::sel_787()).await?;
    let second = FakeRelay::start(RelayProfile::sel_787()).await?;
    let mut cfg = fast_config();
    cfg.workers = 2;
    let scanner = Scanner::new(cfg)?;

    let targets = vec![second.target(), first.target()];
    let reports = scanner.scan_all(targets, CancellationToken::new()).await;

    let ports: Vec<u16> = reports.iter().map(|r| r.target.telnet_port).collect();
    assert_eq!(ports, vec![second.telnet_port, first.telnet_port]);
    assert!(reports.iter().all(|r| r.model() == Some("SEL-787")));
    Ok(())
}
