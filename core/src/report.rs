//! Merges component outcomes into one [`ScanReport`].
//!
//! Pure: no I/O, and nothing is reclassified. Findings keep the order the
//! components produced them in, and events are concatenated in component
//! order.

use chrono::{DateTime, Utc};

use relayprobe_common::network::target::Target;
use relayprobe_common::report::escalation::EscalationAttempt;
use relayprobe_common::report::finding::AnomalyFinding;
use relayprobe_common::report::fingerprint::FingerprintRecord;
use relayprobe_common::report::{
    EnumerationResult, ScanReport, SectionOutcome, SectionStatus, SectionStatuses,
};

/// Everything the four components returned for one target.
#[derive(Debug, Clone)]
pub struct ComponentOutputs {
    pub fingerprint: SectionOutcome<FingerprintRecord>,
    pub escalation: SectionOutcome<Vec<EscalationAttempt>>,
    pub enumeration: SectionOutcome<EnumerationResult>,
    pub write_probe: SectionOutcome<Vec<AnomalyFinding>>,
}

impl ComponentOutputs {
    /// Outputs for a target no component ever ran against.
    pub fn not_run(status: SectionStatus) -> Self {
        Self {
            fingerprint: empty(status.clone(), FingerprintRecord::empty()),
            escalation: empty(status.clone(), Vec::new()),
            enumeration: empty(status.clone(), EnumerationResult::default()),
            write_probe: empty(status, Vec::new()),
        }
    }
}

fn empty<T>(status: SectionStatus, data: T) -> SectionOutcome<T> {
    SectionOutcome {
        status,
        data,
        events: Vec::new(),
    }
}

pub fn assemble(
    target: Target,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    outputs: ComponentOutputs,
) -> ScanReport {
    let ComponentOutputs {
        fingerprint,
        escalation,
        enumeration,
        write_probe,
    } = outputs;

    let sections = SectionStatuses {
        fingerprint: fingerprint.status,
        escalation: escalation.status,
        enumeration: enumeration.status,
        write_probe: write_probe.status,
    };

    let EnumerationResult {
        holding_registers,
        input_registers,
        coils,
        discrete_inputs,
        unreadable,
        findings: mut sweep_findings,
    } = enumeration.data;
    sweep_findings.extend(write_probe.data);

    let mut events = fingerprint.events;
    events.extend(escalation.events);
    events.extend(enumeration.events);
    events.extend(write_probe.events);

    ScanReport {
        target,
        started_at,
        finished_at,
        sections,
        fingerprint: fingerprint.data,
        escalation: escalation.data,
        holding_registers,
        input_registers,
        coils,
        discrete_inputs,
        unreadable,
        findings: sweep_findings,
        events,
    }
}
