use std::time::{Duration, Instant};

use anyhow::Context;
use colored::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::commands::ScanArgs;
use crate::rprint;
use crate::terminal::{colors, format, print};
use relayprobe_common::config::{LabelMode, ScanConfig};
use relayprobe_common::network::target::Target;
use relayprobe_common::report::ScanReport;
use relayprobe_common::report::finding::Severity;
use relayprobe_common::report::fingerprint::{FID_KEY, FIRMWARE_KEY, MODEL_KEY};
use relayprobe_common::{error, success, warn};
use relayprobe_core::Scanner;
use relayprobe_core::escalation::EscalationUpdate;

pub async fn scan(args: ScanArgs, mut cfg: ScanConfig, quiet: u8) -> anyhow::Result<()> {
    apply_overrides(&args, &mut cfg);

    let targets: Vec<Target> = args
        .target
        .clone()
        .into_targets(args.telnet_port, args.modbus_port)?;

    if !cfg.write_probe.dry_run {
        warn!(
            coils = ?cfg.write_probe.coils,
            registers = ?cfg.write_probe.registers,
            "write probes enabled: accepted writes change relay state"
        );
    }

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let scanner = Scanner::new(cfg)?
        .with_assumed_identity(args.assume_model.clone(), args.assume_version.clone())
        .with_progress(progress_tx);

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());
    let progress = spawn_progress_printer(progress_rx, quiet);

    let start_time = Instant::now();
    let reports: Vec<ScanReport> = scanner.scan_all(targets, cancel.clone()).await;

    // the printer exits once every sender is gone
    drop(scanner);
    join_progress(progress).await;

    print_reports(&reports, quiet);
    print_summary(&reports, start_time.elapsed(), cancel.is_cancelled(), quiet);

    if let Some(path) = &args.json {
        let json = serde_json::to_string_pretty(&reports)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        success!(path = %path.display(), "reports written");
    }

    Ok(())
}

fn apply_overrides(args: &ScanArgs, cfg: &mut ScanConfig) {
    if args.allow_writes {
        cfg.write_probe.dry_run = false;
    }
    if args.verbose_labels {
        cfg.enumeration.label_mode = LabelMode::Verbose;
    }
    if let Some(workers) = args.workers {
        cfg.workers = workers;
    }
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight steps");
            cancel.cancel();
        }
    });
}

fn spawn_progress_printer(
    mut rx: mpsc::UnboundedReceiver<EscalationUpdate>,
    quiet: u8,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            if quiet > 0 || !update.attempt.status.is_terminal() {
                continue;
            }
            print::print_status(format!(
                "{} {} {}",
                update.host.color(colors::HOST),
                update.attempt.role.color(colors::LABEL),
                format::attempt_status(update.attempt.status)
            ));
        }
    })
}

async fn join_progress(progress: JoinHandle<()>) {
    if let Err(e) = progress.await {
        error!("progress printer did not complete: {e}");
    }
}

fn print_reports(reports: &[ScanReport], quiet: u8) {
    if quiet > 1 {
        return;
    }

    print::header("scan results", 0);
    for (idx, report) in reports.iter().enumerate() {
        print_report(idx, report);
        if idx + 1 != reports.len() {
            rprint!();
        }
    }
}

fn print_report(idx: usize, report: &ScanReport) {
    print::tree_head(idx, &report.target.host);

    print_identity(report);
    print_escalation(report);
    print_readings(report);
    print_findings(report);
    print_sections(report);
}

fn print_identity(report: &ScanReport) {
    print::subtree_head("Identity");
    let fingerprint = &report.fingerprint;
    if fingerprint.is_empty() {
        print::as_tree_one_level(vec![("Model".to_string(), "unknown".dimmed())]);
        return;
    }

    let mut details = Vec::new();
    for (label, key) in [("Model", MODEL_KEY), ("Firmware", FIRMWARE_KEY), ("FID", FID_KEY)] {
        if let Some(value) = fingerprint.get(key) {
            details.push((label.to_string(), value.color(colors::VALUE)));
        }
    }
    for (key, entry) in &fingerprint.attributes {
        if [MODEL_KEY, FIRMWARE_KEY, FID_KEY].contains(&key.as_str()) {
            continue;
        }
        let value = match &entry.extra {
            Some(extra) => format!("{} ({extra})", entry.value),
            None => entry.value.clone(),
        };
        details.push((key.clone(), value.normal()));
    }
    print::as_tree_one_level(details);
}

fn print_escalation(report: &ScanReport) {
    if report.escalation.is_empty() {
        return;
    }

    print::subtree_head("Access levels");
    let details = report
        .escalation
        .iter()
        .map(|attempt| {
            let status = format::attempt_status(attempt.status);
            let value = match &attempt.detail {
                Some(detail) => format!("{status} {}", detail.dimmed()).normal(),
                None => status,
            };
            (attempt.role.clone(), value)
        })
        .collect();
    print::as_tree_one_level(details);
}

fn print_readings(report: &ScanReport) {
    let register_sets = [
        ("Holding registers", &report.holding_registers),
        ("Input registers", &report.input_registers),
    ];
    for (title, readings) in register_sets {
        if !readings.is_empty() {
            print::subtree_head(title);
            print::as_tree_one_level(format::register_details(readings));
        }
    }

    let bit_sets = [
        ("Coils", &report.coils),
        ("Discrete inputs", &report.discrete_inputs),
    ];
    for (title, readings) in bit_sets {
        if !readings.is_empty() {
            print::subtree_head(title);
            print::as_tree_one_level(format::bit_details(readings));
        }
    }

    if !report.unreadable.is_empty() {
        print::subtree_head("Unreadable");
        let details = report
            .unreadable
            .iter()
            .map(|u| (format!("{} {}", u.class, u.range), u.reason.dimmed()))
            .collect();
        print::as_tree_one_level(details);
    }
}

fn print_findings(report: &ScanReport) {
    if report.findings.is_empty() {
        return;
    }

    print::subtree_head("Findings");
    let details = report
        .findings
        .iter()
        .map(|f| {
            let key = format!("{} {}", f.kind, f.range);
            let value = format!("{} {}", format::severity(f.severity), f.detail).normal();
            (key, value)
        })
        .collect();
    print::as_tree_one_level(details);
}

fn print_sections(report: &ScanReport) {
    let failed = report.failed_sections();
    if failed.is_empty() {
        return;
    }

    print::subtree_head("Incomplete");
    let details = failed
        .into_iter()
        .map(|(subsystem, status)| (subsystem.to_string(), format::section_status(status)))
        .collect();
    print::as_tree_one_level(details);
}

fn print_summary(reports: &[ScanReport], total_time: Duration, cancelled: bool, quiet: u8) {
    let critical = reports
        .iter()
        .filter(|r| r.worst_severity() == Some(Severity::Critical))
        .count();
    let granted = reports.iter().filter(|r| !r.granted_roles().is_empty()).count();

    let relays: ColoredString = format!("{} relays", reports.len()).bold().green();
    let critical: ColoredString = format!("{critical} critical").color(colors::CRITICAL).bold();
    let granted: ColoredString = format!("{granted} with weak passwords").color(colors::WARN);
    let total_time: ColoredString = format!("{:.2}s", total_time.as_secs_f64()).bold().yellow();
    let verb = if cancelled { "Scan Interrupted" } else { "Scan Complete" };

    let output: ColoredString =
        format!("{verb}: {relays} in {total_time}, {critical}, {granted}").color(colors::TEXT_DEFAULT);

    match quiet {
        0 => {
            print::fat_separator();
            print::centerln(&output.to_string());
            print::fat_separator();
        }
        _ => {
            rprint!();
            success!("{}", output)
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
