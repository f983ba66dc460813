//! Register map semantics: label lookup, value-class scaling and batch
//! planning for Modbus sweeps.

use std::collections::BTreeMap;

use relayprobe_common::config::{LabelEntry, LabelMode};
use relayprobe_common::report::reading::{
    AddressRange, BitReading, BitState, DataClass, DecodedValue, RegisterReading,
};

/// Smallest batch that can be flagged as a repeated-value anomaly.
pub const MIN_REPEATED_BATCH: usize = 5;

/// Scaling rule implied by a label's suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    /// `*MAG`, `*THD`, `*RMS`, `*RTD`: tenths.
    Tenths,
    /// `*FREQ`, `*PF`: hundredths.
    Hundredths,
    /// Anything else is reported unchanged.
    Raw,
}

impl ValueClass {
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_uppercase();
        if ["MAG", "THD", "RMS", "RTD"].iter().any(|s| label.ends_with(s)) {
            ValueClass::Tenths
        } else if ["FREQ", "PF"].iter().any(|s| label.ends_with(s)) {
            ValueClass::Hundredths
        } else {
            ValueClass::Raw
        }
    }

    pub fn scale(&self) -> Option<f64> {
        match self {
            ValueClass::Tenths => Some(0.1),
            ValueClass::Hundredths => Some(0.01),
            ValueClass::Raw => None,
        }
    }

    pub fn decode(&self, raw: u16) -> DecodedValue {
        match self.scale() {
            Some(scale) => DecodedValue::Scaled {
                value: f64::from(raw) * scale,
                scale,
            },
            None => DecodedValue::Raw { value: raw },
        }
    }

    /// Inverse of [`ValueClass::decode`], rounding to the nearest raw step.
    pub fn encode(&self, decoded: f64) -> Option<u16> {
        let raw = match self.scale() {
            Some(scale) => (decoded / scale).round(),
            None => decoded.round(),
        };
        (0.0..=f64::from(u16::MAX))
            .contains(&raw)
            .then_some(raw as u16)
    }
}

/// Address → label lookup for one data class.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    labels: BTreeMap<u16, String>,
}

impl LabelMap {
    pub fn from_entries(entries: &[LabelEntry]) -> Self {
        Self {
            labels: entries
                .iter()
                .map(|e| (e.address, e.label.clone()))
                .collect(),
        }
    }

    pub fn resolve(&self, address: u16) -> Option<&str> {
        self.labels.get(&address).map(String::as_str)
    }
}

/// Decodes one register value. Returns `None` when strict mode hides an
/// unlabeled address.
///
/// Input registers are never scaled.
pub fn decode_register(
    labels: &LabelMap,
    class: DataClass,
    address: u16,
    raw: u16,
    mode: LabelMode,
) -> Option<RegisterReading> {
    let label = labels.resolve(address);
    if label.is_none() && mode == LabelMode::Strict {
        return None;
    }

    let value = match (class, label) {
        (DataClass::HoldingRegister, Some(label)) => ValueClass::from_label(label).decode(raw),
        _ => DecodedValue::Raw { value: raw },
    };

    Some(RegisterReading {
        address,
        class,
        raw,
        label: label.map(str::to_string),
        value,
    })
}

pub fn decode_bit(
    labels: &LabelMap,
    class: DataClass,
    address: u16,
    state: bool,
    mode: LabelMode,
) -> Option<BitReading> {
    let label = labels.resolve(address);
    if label.is_none() && mode == LabelMode::Strict {
        return None;
    }

    Some(BitReading {
        address,
        class,
        label: label.map(str::to_string),
        state: BitState::from(state),
    })
}

/// True when a batch is large enough and every value is bit-identical.
pub fn is_repeated_batch(values: &[u16]) -> bool {
    values.len() >= MIN_REPEATED_BATCH && values.windows(2).all(|w| w[0] == w[1])
}

/// Splits a span into consecutive, non-overlapping batches of at most
/// `batch_size` addresses.
pub fn batches(span: AddressRange, batch_size: u16) -> Vec<AddressRange> {
    let mut out = Vec::new();
    if batch_size == 0 {
        return out;
    }

    let end = u32::from(span.start) + u32::from(span.count);
    let mut start = u32::from(span.start);
    while start < end {
        let count = (end - start).min(u32::from(batch_size));
        out.push(AddressRange::new(start as u16, count as u16));
        start += count;
    }
    out
}
