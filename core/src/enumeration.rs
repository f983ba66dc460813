//! Modbus register sweep.
//!
//! Holding registers, input registers, coils and discrete inputs are read in
//! that order, span by span, in batches. A batch that cannot be read is
//! recorded as unreadable and the sweep moves on.

use tokio_util::sync::CancellationToken;

use relayprobe_common::config::{EnumerationConfig, LabelMode};
use relayprobe_common::error::ScanError;
use relayprobe_common::report::finding::{AnomalyFinding, FindingKind, Severity};
use relayprobe_common::report::reading::{AddressRange, DataClass, UnreadableRange};
use relayprobe_common::report::{EnumerationResult, EventLog};
use relayprobe_protocols::registers::{self, LabelMap};

use crate::network::{RegisterChannel, cancellable};

/// Consecutive transport failures after which the rest of the sweep is
/// given up on.
pub const MAX_TRANSPORT_FAILURES: usize = 3;

pub const SWEEP_ORDER: [DataClass; 4] = [
    DataClass::HoldingRegister,
    DataClass::InputRegister,
    DataClass::Coil,
    DataClass::DiscreteInput,
];

/// Every batch the sweep will issue, in order.
pub fn plan(cfg: &EnumerationConfig) -> Vec<(DataClass, AddressRange)> {
    SWEEP_ORDER
        .iter()
        .flat_map(|&class| {
            cfg.spans(class)
                .iter()
                .flat_map(move |&span| registers::batches(span, cfg.batch_size))
                .map(move |batch| (class, batch))
        })
        .collect()
}

enum BatchValues {
    Words(Vec<u16>),
    Bits(Vec<bool>),
}

async fn read_batch(
    channel: &mut dyn RegisterChannel,
    class: DataClass,
    batch: AddressRange,
) -> Result<BatchValues, ScanError> {
    let (start, count) = (batch.start, batch.count);
    Ok(match class {
        DataClass::HoldingRegister => {
            BatchValues::Words(channel.read_holding_registers(start, count).await?)
        }
        DataClass::InputRegister => {
            BatchValues::Words(channel.read_input_registers(start, count).await?)
        }
        DataClass::Coil => BatchValues::Bits(channel.read_coils(start, count).await?),
        DataClass::DiscreteInput => {
            BatchValues::Bits(channel.read_discrete_inputs(start, count).await?)
        }
    })
}

struct Labels {
    holding: LabelMap,
    input: LabelMap,
    coils: LabelMap,
    discrete: LabelMap,
}

impl Labels {
    fn from_config(cfg: &EnumerationConfig) -> Self {
        Self {
            holding: LabelMap::from_entries(&cfg.labels.holding),
            input: LabelMap::from_entries(&cfg.labels.input),
            coils: LabelMap::from_entries(&cfg.labels.coils),
            discrete: LabelMap::from_entries(&cfg.labels.discrete),
        }
    }

    fn for_class(&self, class: DataClass) -> &LabelMap {
        match class {
            DataClass::HoldingRegister => &self.holding,
            DataClass::InputRegister => &self.input,
            DataClass::Coil => &self.coils,
            DataClass::DiscreteInput => &self.discrete,
        }
    }
}

fn record_words(
    result: &mut EnumerationResult,
    labels: &LabelMap,
    class: DataClass,
    batch: AddressRange,
    values: &[u16],
    mode: LabelMode,
) {
    let readings = batch
        .addresses()
        .zip(values)
        .filter_map(|(address, &raw)| registers::decode_register(labels, class, address, raw, mode));

    match class {
        DataClass::InputRegister => result.input_registers.extend(readings),
        _ => result.holding_registers.extend(readings),
    }

    if registers::is_repeated_batch(values) {
        result.findings.push(AnomalyFinding::new(
            class,
            batch,
            FindingKind::RepeatedValue,
            Severity::Warn,
            format!("all {} values read {}", values.len(), values[0]),
        ));
    }
}

fn record_bits(
    result: &mut EnumerationResult,
    labels: &LabelMap,
    class: DataClass,
    batch: AddressRange,
    states: &[bool],
    mode: LabelMode,
) {
    let readings = batch
        .addresses()
        .zip(states)
        .filter_map(|(address, &state)| registers::decode_bit(labels, class, address, state, mode));

    match class {
        DataClass::DiscreteInput => result.discrete_inputs.extend(readings),
        _ => result.coils.extend(readings),
    }
}

/// Reads every configured span on an open session.
///
/// Returns the collected data and, when the sweep had to stop early, the
/// error that stopped it. Batches never issued are listed as unreadable.
pub async fn sweep(
    channel: &mut dyn RegisterChannel,
    cfg: &EnumerationConfig,
    log: &mut EventLog,
    cancel: &CancellationToken,
) -> (EnumerationResult, Option<ScanError>) {
    let labels = Labels::from_config(cfg);
    let batches = plan(cfg);
    let mut result = EnumerationResult::default();
    let mut transport_failures = 0;

    log.debug(format!("sweeping {} batches", batches.len()));

    for (idx, &(class, batch)) in batches.iter().enumerate() {
        match cancellable(cancel, read_batch(channel, class, batch)).await {
            Ok(values) => {
                transport_failures = 0;
                let returned = match &values {
                    BatchValues::Words(words) => words.len(),
                    BatchValues::Bits(bits) => bits.len(),
                };
                if returned < usize::from(batch.count) {
                    log.warn(format!(
                        "{class} {batch}: short response, {returned} of {} values",
                        batch.count
                    ));
                }
                let map = labels.for_class(class);
                match values {
                    BatchValues::Words(words) => {
                        record_words(&mut result, map, class, batch, &words, cfg.label_mode)
                    }
                    BatchValues::Bits(bits) => {
                        record_bits(&mut result, map, class, batch, &bits, cfg.label_mode)
                    }
                }
            }
            Err(ScanError::Cancelled) => {
                log.warn("sweep cancelled");
                mark_unissued(&mut result, &batches[idx..], "scan cancelled");
                return (result, Some(ScanError::Cancelled));
            }
            Err(e) => {
                if e.is_connection() {
                    transport_failures += 1;
                } else {
                    transport_failures = 0;
                }
                log.warn(format!("{class} {batch} unreadable: {e}"));
                result.unreadable.push(UnreadableRange {
                    class,
                    range: batch,
                    reason: e.to_string(),
                });

                if transport_failures >= MAX_TRANSPORT_FAILURES {
                    log.error(format!(
                        "giving up after {transport_failures} consecutive transport failures"
                    ));
                    mark_unissued(
                        &mut result,
                        &batches[idx + 1..],
                        "sweep aborted after transport failures",
                    );
                    return (result, Some(e));
                }
            }
        }
    }

    log.info(format!(
        "read {} holding, {} input, {} coil, {} discrete; {} batches unreadable",
        result.holding_registers.len(),
        result.input_registers.len(),
        result.coils.len(),
        result.discrete_inputs.len(),
        result.unreadable.len()
    ));
    (result, None)
}

fn mark_unissued(result: &mut EnumerationResult, rest: &[(DataClass, AddressRange)], reason: &str) {
    result
        .unreadable
        .extend(rest.iter().map(|&(class, range)| UnreadableRange {
            class,
            range,
            reason: reason.to_string(),
        }));
}
