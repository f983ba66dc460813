//! Device identification over the Telnet shell.

use tokio_util::sync::CancellationToken;

use relayprobe_common::config::ScanConfig;
use relayprobe_common::error::ScanError;
use relayprobe_common::network::target::Target;
use relayprobe_common::report::fingerprint::FingerprintRecord;
use relayprobe_common::report::{EventLog, SectionOutcome, SectionStatus, Subsystem};
use relayprobe_protocols::fingerprint;

use crate::network::{Connector, LineChannel, cancellable};

/// Issues the identification command once and parses whatever came back.
pub async fn collect(
    channel: &mut dyn LineChannel,
    cfg: &ScanConfig,
) -> Result<FingerprintRecord, ScanError> {
    let output = channel
        .exchange(&cfg.telnet.identify_command, cfg.timing.fingerprint_wait())
        .await?;
    Ok(fingerprint::parse_output(&output))
}

/// Runs the fingerprint subsystem against one target on its own session.
pub async fn run(
    connector: &dyn Connector,
    target: &Target,
    cfg: &ScanConfig,
    cancel: &CancellationToken,
) -> SectionOutcome<FingerprintRecord> {
    let mut log = EventLog::new(&target.host, Subsystem::Fingerprint);

    let mut channel = match cancellable(cancel, connector.open_telnet(target, cfg)).await {
        Ok(channel) => channel,
        Err(e) => return failed(e, log),
    };

    let result = cancellable(cancel, collect(channel.as_mut(), cfg)).await;
    channel.close().await;

    match result {
        Ok(record) => {
            if record.is_empty() {
                log.warn("identification output held no recognizable attributes");
            } else {
                log.info(format!(
                    "model {} firmware {} ({} attributes)",
                    record.model.as_deref().unwrap_or("unknown"),
                    record.version.as_deref().unwrap_or("unknown"),
                    record.attributes.len()
                ));
            }
            SectionOutcome::new(SectionStatus::Completed, record, log)
        }
        Err(e) => failed(e, log),
    }
}

/// Uses an operator-supplied identity instead of probing.
pub fn assumed(
    target: &Target,
    model: Option<String>,
    version: Option<String>,
) -> SectionOutcome<FingerprintRecord> {
    let mut log = EventLog::new(&target.host, Subsystem::Fingerprint);
    let record = FingerprintRecord::assumed(model, version);
    log.info(format!(
        "fingerprint not probed, assuming model {} firmware {}",
        record.model.as_deref().unwrap_or("unknown"),
        record.version.as_deref().unwrap_or("unknown")
    ));
    SectionOutcome::new(
        SectionStatus::Skipped("identity supplied by operator".into()),
        record,
        log,
    )
}

fn failed(err: ScanError, mut log: EventLog) -> SectionOutcome<FingerprintRecord> {
    let status = match err {
        ScanError::Cancelled => {
            log.warn("fingerprint cancelled");
            SectionStatus::Cancelled
        }
        err => {
            log.error(format!("fingerprint failed: {err}"));
            SectionStatus::Failed(err.to_string())
        }
    };
    SectionOutcome::new(status, FingerprintRecord::empty(), log)
}
