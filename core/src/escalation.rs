//! Privilege escalation over the Telnet shell.
//!
//! The ladder is walked in order on a single session. Each role must be
//! granted before the next one is tried; the first rejection ends the walk
//! and every role after it is reported as skipped.

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use relayprobe_common::config::{ScanConfig, TimingConfig};
use relayprobe_common::error::ScanError;
use relayprobe_common::network::target::Target;
use relayprobe_common::report::escalation::{EscalationAttempt, EscalationLadder};
use relayprobe_common::report::{EventLog, SectionOutcome, SectionStatus, Subsystem};

use crate::network::{Connector, LineChannel, cancellable, pause};

/// Live progress of one ladder step, for interactive display.
#[derive(Debug, Clone)]
pub struct EscalationUpdate {
    pub host: String,
    pub index: usize,
    pub attempt: EscalationAttempt,
}

struct Progress<'a> {
    host: &'a str,
    tx: Option<&'a UnboundedSender<EscalationUpdate>>,
}

impl Progress<'_> {
    fn publish(&self, ladder: &EscalationLadder, from: usize) {
        let Some(tx) = self.tx else { return };
        for (index, attempt) in ladder.attempts().iter().enumerate().skip(from) {
            // receiver gone means nobody is watching
            let _ = tx.send(EscalationUpdate {
                host: self.host.to_string(),
                index,
                attempt: attempt.clone(),
            });
        }
    }
}

/// Sends role then credential with the configured pauses, and returns the
/// shell output that followed.
pub async fn attempt_role(
    channel: &mut dyn LineChannel,
    role: &str,
    credential: &str,
    timing: &TimingConfig,
) -> Result<String, ScanError> {
    channel.send_line(&role.to_ascii_lowercase()).await?;
    tokio::time::sleep(timing.role_wait()).await;
    channel.send_line(credential).await?;
    tokio::time::sleep(timing.password_wait()).await;
    channel.read_available().await
}

/// Walks the ladder on an open session.
///
/// Returns the final ladder and, if the walk was cut short by the transport
/// or by cancellation, the error that stopped it.
pub async fn walk_ladder(
    channel: &mut dyn LineChannel,
    cfg: &ScanConfig,
    log: &mut EventLog,
    cancel: &CancellationToken,
    progress_tx: Option<&UnboundedSender<EscalationUpdate>>,
    host: &str,
) -> (EscalationLadder, Option<ScanError>) {
    let mut ladder = EscalationLadder::new(&cfg.escalation.ladder);
    let progress = Progress { host, tx: progress_tx };
    let marker = cfg.escalation.success_marker.as_str();
    progress.publish(&ladder, 0);

    while let Some(idx) = ladder.next_pending() {
        let Some(step) = ladder.get(idx) else { break };
        let (role, credential) = (step.role.clone(), step.credential.clone());

        let outcome = match pause(cancel, cfg.timing.step_pause()).await {
            Ok(()) => {
                cancellable(
                    cancel,
                    attempt_role(channel, &role, &credential, &cfg.timing),
                )
                .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(response) if response.contains(marker) => {
                ladder.mark_success(idx);
                log.info(format!("role {role} granted"));
                progress.publish(&ladder, idx);
            }
            Ok(_) => {
                ladder.mark_failed(idx, Some(format!("{marker} not seen in response")));
                log.warn(format!("role {role} rejected, remaining roles skipped"));
                progress.publish(&ladder, idx);
            }
            Err(ScanError::Cancelled) => {
                ladder.skip_remaining("scan cancelled");
                log.warn(format!("escalation cancelled before {role} completed"));
                progress.publish(&ladder, idx);
                return (ladder, Some(ScanError::Cancelled));
            }
            Err(e) => {
                ladder.mark_failed(idx, Some(e.to_string()));
                log.error(format!("role {role} attempt aborted: {e}"));
                progress.publish(&ladder, idx);
                return (ladder, Some(e));
            }
        }
    }

    (ladder, None)
}

/// Runs the escalation subsystem against one target on its own session.
pub async fn run(
    connector: &dyn Connector,
    target: &Target,
    cfg: &ScanConfig,
    cancel: &CancellationToken,
    progress_tx: Option<&UnboundedSender<EscalationUpdate>>,
) -> SectionOutcome<Vec<EscalationAttempt>> {
    let mut log = EventLog::new(&target.host, Subsystem::Escalation);

    if cfg.escalation.ladder.is_empty() {
        log.info("no credentials configured");
        return SectionOutcome::new(
            SectionStatus::Skipped("empty ladder".into()),
            Vec::new(),
            log,
        );
    }

    let mut channel = match cancellable(cancel, connector.open_telnet(target, cfg)).await {
        Ok(channel) => channel,
        Err(e) => {
            let mut ladder = EscalationLadder::new(&cfg.escalation.ladder);
            let status = match e {
                ScanError::Cancelled => {
                    ladder.skip_remaining("scan cancelled");
                    SectionStatus::Cancelled
                }
                e => {
                    ladder.skip_remaining("no telnet session");
                    log.error(format!("escalation failed: {e}"));
                    SectionStatus::Failed(e.to_string())
                }
            };
            Progress { host: &target.host, tx: progress_tx }.publish(&ladder, 0);
            return SectionOutcome::new(status, ladder.into_attempts(), log);
        }
    };

    let (ladder, stopped) =
        walk_ladder(channel.as_mut(), cfg, &mut log, cancel, progress_tx, &target.host).await;
    channel.close().await;

    let status = match stopped {
        None => SectionStatus::Completed,
        Some(ScanError::Cancelled) => SectionStatus::Cancelled,
        Some(e) => SectionStatus::Failed(e.to_string()),
    };
    match ladder.highest_granted() {
        Some(role) => log.info(format!("highest role granted: {role}")),
        None => log.info("no role granted"),
    }

    SectionOutcome::new(status, ladder.into_attempts(), log)
}
