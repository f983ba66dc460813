//! Per-role state of an escalation ladder.
//!
//! [`EscalationLadder`] owns the ordering invariant: attempts resolve strictly
//! front to back, and the first `Failed` attempt turns every later attempt
//! into `Skipped`. The driver in `relayprobe-core` only decides *which*
//! transition to apply; it cannot put the ladder into any other shape.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub role: String,
    pub credential: String,
}

impl Credential {
    pub fn new(role: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            credential: credential.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttemptStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::Pending)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptStatus::Pending => "PENDING",
            AttemptStatus::Success => "SUCCESS",
            AttemptStatus::Failed => "FAILED",
            AttemptStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationAttempt {
    pub role: String,
    pub credential: String,
    pub status: AttemptStatus,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationLadder {
    attempts: Vec<EscalationAttempt>,
}

impl EscalationLadder {
    pub fn new(credentials: &[Credential]) -> Self {
        let attempts = credentials
            .iter()
            .map(|c| EscalationAttempt {
                role: c.role.clone(),
                credential: c.credential.clone(),
                status: AttemptStatus::Pending,
                detail: None,
            })
            .collect();
        Self { attempts }
    }

    /// Index of the attempt to run next, if the ladder has not terminated.
    pub fn next_pending(&self) -> Option<usize> {
        self.attempts
            .iter()
            .position(|a| a.status == AttemptStatus::Pending)
    }

    /// Marks the current attempt as accepted. Returns `false` if `idx` is not
    /// the next pending attempt.
    pub fn mark_success(&mut self, idx: usize) -> bool {
        if self.next_pending() != Some(idx) {
            return false;
        }
        self.attempts[idx].status = AttemptStatus::Success;
        true
    }

    /// Marks the current attempt as rejected and skips the rest of the ladder.
    pub fn mark_failed(&mut self, idx: usize, detail: Option<String>) -> bool {
        if self.next_pending() != Some(idx) {
            return false;
        }
        self.attempts[idx].status = AttemptStatus::Failed;
        self.attempts[idx].detail = detail;
        for later in &mut self.attempts[idx + 1..] {
            later.status = AttemptStatus::Skipped;
        }
        true
    }

    /// Skips every attempt that has not run yet.
    pub fn skip_remaining(&mut self, reason: &str) {
        for attempt in &mut self.attempts {
            if attempt.status == AttemptStatus::Pending {
                attempt.status = AttemptStatus::Skipped;
                attempt.detail = Some(reason.to_string());
            }
        }
    }

    pub fn attempts(&self) -> &[EscalationAttempt] {
        &self.attempts
    }

    pub fn get(&self, idx: usize) -> Option<&EscalationAttempt> {
        self.attempts.get(idx)
    }

    pub fn statuses(&self) -> Vec<AttemptStatus> {
        self.attempts.iter().map(|a| a.status).collect()
    }

    /// Highest role that was granted, if any.
    pub fn highest_granted(&self) -> Option<&str> {
        self.attempts
            .iter()
            .rev()
            .find(|a| a.status == AttemptStatus::Success)
            .map(|a| a.role.as_str())
    }

    pub fn into_attempts(self) -> Vec<EscalationAttempt> {
        self.attempts
    }
}
