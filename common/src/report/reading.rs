use std::fmt;

use serde::{Deserialize, Serialize};

/// The four Modbus data classes a relay exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClass {
    HoldingRegister,
    InputRegister,
    Coil,
    DiscreteInput,
}

impl DataClass {
    /// Prefix used for addresses that have no label.
    pub fn generic_prefix(&self) -> &'static str {
        match self {
            DataClass::HoldingRegister => "Reg",
            DataClass::InputRegister => "InReg",
            DataClass::Coil => "Coil",
            DataClass::DiscreteInput => "Input",
        }
    }
}

impl fmt::Display for DataClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataClass::HoldingRegister => "holding registers",
            DataClass::InputRegister => "input registers",
            DataClass::Coil => "coils",
            DataClass::DiscreteInput => "discrete inputs",
        };
        f.write_str(name)
    }
}

/// A contiguous block of Modbus addresses: `start..start + count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: u16,
    pub count: u16,
}

impl AddressRange {
    pub fn new(start: u16, count: u16) -> Self {
        Self { start, count }
    }

    pub fn single(address: u16) -> Self {
        Self::new(address, 1)
    }

    /// Last address in the range, or `None` if the range is empty or runs
    /// past the 16-bit address space.
    pub fn last(&self) -> Option<u16> {
        if self.count == 0 {
            return None;
        }
        self.start.checked_add(self.count - 1)
    }

    pub fn contains(&self, address: u16) -> bool {
        match self.last() {
            Some(last) => (self.start..=last).contains(&address),
            None => false,
        }
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        match (self.last(), other.last()) {
            (Some(a_last), Some(b_last)) => self.start <= b_last && other.start <= a_last,
            _ => false,
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = u16> {
        let start = u32::from(self.start);
        let end = start + u32::from(self.count);
        (start..end.min(u32::from(u16::MAX) + 1)).map(|a| a as u16)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last() {
            Some(last) if last != self.start => write!(f, "{}-{}", self.start, last),
            _ => write!(f, "{}", self.start),
        }
    }
}

/// Register value after the label table has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedValue {
    /// Raw value multiplied by `scale`.
    Scaled { value: f64, scale: f64 },
    /// Raw value reported unchanged.
    Raw { value: u16 },
}

impl DecodedValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            DecodedValue::Scaled { value, .. } => *value,
            DecodedValue::Raw { value } => f64::from(*value),
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Scaled { value, scale } if *scale < 0.1 => write!(f, "{value:.2}"),
            DecodedValue::Scaled { value, .. } => write!(f, "{value:.1}"),
            DecodedValue::Raw { value } => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterReading {
    pub address: u16,
    pub class: DataClass,
    pub raw: u16,
    pub label: Option<String>,
    pub value: DecodedValue,
}

impl RegisterReading {
    pub fn display_label(&self) -> String {
        display_label(self.label.as_deref(), self.class, self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BitState {
    On,
    Off,
}

impl From<bool> for BitState {
    fn from(value: bool) -> Self {
        if value { BitState::On } else { BitState::Off }
    }
}

impl fmt::Display for BitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitState::On => f.write_str("ON"),
            BitState::Off => f.write_str("OFF"),
        }
    }
}

/// Single-bit reading; used for both coils and discrete inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitReading {
    pub address: u16,
    pub class: DataClass,
    pub label: Option<String>,
    pub state: BitState,
}

impl BitReading {
    pub fn display_label(&self) -> String {
        display_label(self.label.as_deref(), self.class, self.address)
    }
}

pub type CoilReading = BitReading;
pub type DiscreteReading = BitReading;

/// A batch the device refused to return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadableRange {
    pub class: DataClass,
    pub range: AddressRange,
    pub reason: String,
}

fn display_label(label: Option<&str>, class: DataClass, address: u16) -> String {
    match label {
        Some(label) => label.to_string(),
        None => format!("{} {address}", class.generic_prefix()),
    }
}
