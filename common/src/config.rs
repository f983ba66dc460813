//! Scan configuration.
//!
//! A [`ScanConfig`] is built once (defaults, then an optional TOML file, then
//! CLI overrides), validated, and then passed by reference into every
//! component. Nothing reads configuration from process-wide state.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::report::escalation::Credential;
use crate::report::reading::{AddressRange, DataClass};

/// Modbus limit for a single register read (FC 03/04); bit reads allow more.
pub const MAX_REGISTER_BATCH: u16 = 125;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Targets scanned concurrently.
    pub workers: usize,
    pub timing: TimingConfig,
    pub telnet: TelnetConfig,
    pub escalation: EscalationConfig,
    pub enumeration: EnumerationConfig,
    pub write_probe: WriteProbeConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            timing: TimingConfig::default(),
            telnet: TelnetConfig::default(),
            escalation: EscalationConfig::default(),
            enumeration: EnumerationConfig::default(),
            write_probe: WriteProbeConfig::default(),
        }
    }
}

/// Intervals and timeouts, in milliseconds.
///
/// The Telnet shell has no prompt detection, so the `*_wait_ms` values are
/// the only synchronization between a command and its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
    /// Wait after the identification command.
    pub fingerprint_wait_ms: u64,
    /// Wait after a role name, for the password prompt.
    pub role_wait_ms: u64,
    /// Wait after a password, for the acceptance banner.
    pub password_wait_ms: u64,
    /// Pause between two ladder steps.
    pub step_pause_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3_000,
            io_timeout_ms: 2_000,
            fingerprint_wait_ms: 1_000,
            role_wait_ms: 500,
            password_wait_ms: 800,
            step_pause_ms: 300,
        }
    }
}

impl TimingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn fingerprint_wait(&self) -> Duration {
        Duration::from_millis(self.fingerprint_wait_ms)
    }

    pub fn role_wait(&self) -> Duration {
        Duration::from_millis(self.role_wait_ms)
    }

    pub fn password_wait(&self) -> Duration {
        Duration::from_millis(self.password_wait_ms)
    }

    pub fn step_pause(&self) -> Duration {
        Duration::from_millis(self.step_pause_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelnetConfig {
    pub identify_command: String,
    /// Maximum bytes collected per exchange.
    pub read_limit: usize,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            identify_command: "id".to_string(),
            read_limit: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Roles in the order they are tried.
    pub ladder: Vec<Credential>,
    /// Banner substring the relay prints when a role is granted.
    pub success_marker: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            ladder: vec![
                Credential::new("ACC", "OTTER"),
                Credential::new("2AC", "TAIL"),
                Credential::new("CAL", "CLARKE"),
            ],
            success_marker: "TRNSFRMR".to_string(),
        }
    }
}

/// How addresses missing from the label tables are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// Unlabeled addresses are read but not reported.
    Strict,
    /// Unlabeled addresses are reported under a generic name.
    Verbose,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub address: u16,
    pub label: String,
}

impl LabelEntry {
    fn new(address: u16, label: &str) -> Self {
        Self {
            address,
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelTables {
    pub holding: Vec<LabelEntry>,
    pub input: Vec<LabelEntry>,
    pub coils: Vec<LabelEntry>,
    pub discrete: Vec<LabelEntry>,
}

impl LabelTables {
    pub fn for_class(&self, class: DataClass) -> &[LabelEntry] {
        match class {
            DataClass::HoldingRegister => &self.holding,
            DataClass::InputRegister => &self.input,
            DataClass::Coil => &self.coils,
            DataClass::DiscreteInput => &self.discrete,
        }
    }
}

const HOLDING_LABELS: &[(u16, &str)] = &[
    (684, "IAW1_MAG"),
    (685, "IAW1_ANG"),
    (686, "IBW1_MAG"),
    (687, "IBW1_ANG"),
    (688, "ICW1_MAG"),
    (689, "ICW1_ANG"),
    (690, "IAW2_MAG"),
    (691, "IAW2_ANG"),
    (692, "IBW2_MAG"),
    (693, "IBW2_ANG"),
    (694, "ICW2_MAG"),
    (695, "ICW2_ANG"),
    (696, "IN_MAG"),
    (697, "IN_ANG"),
    (698, "VAB_MAG"),
    (699, "VAB_ANG"),
    (700, "VBC_MAG"),
    (701, "VBC_ANG"),
    (702, "VCA_MAG"),
    (703, "VCA_ANG"),
    (704, "FREQ"),
    (705, "PF"),
    (706, "IAW1_THD"),
    (707, "IBW1_THD"),
    (708, "ICW1_THD"),
    (709, "VAB_THD"),
    (710, "IAW1_RMS"),
    (711, "IBW1_RMS"),
    (712, "ICW1_RMS"),
    (713, "WDG1_RTD"),
    (714, "WDG2_RTD"),
    (715, "AMB_RTD"),
];

const INPUT_LABELS: &[(u16, &str)] = &[
    (0, "RELAY_STATUS"),
    (1, "TARGET_LEDS"),
    (2, "ALARM_WORD"),
    (3, "TRIP_COUNT"),
    (4, "ACTIVE_GROUP"),
    (5, "EVENT_COUNT"),
];

const COIL_LABELS: &[(u16, &str)] = &[
    (0, "RB01"),
    (1, "RB02"),
    (2, "RB03"),
    (3, "RB04"),
    (4, "RB05"),
    (5, "RB06"),
    (6, "RB07"),
    (7, "RB08"),
    (8, "OC1"),
    (9, "CC1"),
    (10, "TRGTR"),
];

const DISCRETE_LABELS: &[(u16, &str)] = &[
    (0, "IN101"),
    (1, "IN102"),
    (2, "IN103"),
    (3, "IN104"),
    (4, "OUT101"),
    (5, "OUT102"),
    (6, "OUT103"),
    (7, "TRIP"),
    (8, "52A"),
    (9, "ALARM"),
];

fn entries(table: &[(u16, &str)]) -> Vec<LabelEntry> {
    table.iter().map(|(a, l)| LabelEntry::new(*a, l)).collect()
}

impl Default for LabelTables {
    fn default() -> Self {
        Self {
            holding: entries(HOLDING_LABELS),
            input: entries(INPUT_LABELS),
            coils: entries(COIL_LABELS),
            discrete: entries(DISCRETE_LABELS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumerationConfig {
    pub unit_id: u8,
    pub batch_size: u16,
    pub label_mode: LabelMode,
    pub holding: Vec<AddressRange>,
    pub input: Vec<AddressRange>,
    pub coils: Vec<AddressRange>,
    pub discrete: Vec<AddressRange>,
    pub labels: LabelTables,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            unit_id: 1,
            batch_size: 10,
            label_mode: LabelMode::Strict,
            holding: vec![AddressRange::new(684, 40)],
            input: vec![AddressRange::new(0, 20)],
            coils: vec![AddressRange::new(0, 32)],
            discrete: vec![AddressRange::new(0, 32)],
            labels: LabelTables::default(),
        }
    }
}

impl EnumerationConfig {
    pub fn spans(&self, class: DataClass) -> &[AddressRange] {
        match class {
            DataClass::HoldingRegister => &self.holding,
            DataClass::InputRegister => &self.input,
            DataClass::Coil => &self.coils,
            DataClass::DiscreteInput => &self.discrete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteProbeConfig {
    /// When set, no write is sent to the relay.
    pub dry_run: bool,
    pub coils: Vec<u16>,
    pub registers: Vec<u16>,
    /// Value written to register candidates.
    pub sentinel: u16,
    /// Count a probe that timed out as refused instead of inconclusive.
    pub timeouts_are_rejections: bool,
}

impl Default for WriteProbeConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            coils: vec![100, 101],
            registers: vec![4000, 4001],
            sentinel: 0,
            timeouts_are_rejections: false,
        }
    }
}

impl ScanConfig {
    /// Reads a TOML file on top of the defaults and validates the result.
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("reading {}: {e}", path.display())))?;
        let cfg: ScanConfig = toml::from_str(&raw)
            .map_err(|e| ScanError::Config(format!("parsing {}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects configurations that would make the sweep or probes ambiguous.
    ///
    /// Runs before any network I/O.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.workers == 0 {
            return Err(ScanError::Config("workers must be at least 1".into()));
        }
        if self.telnet.read_limit == 0 {
            return Err(ScanError::Config("telnet.read_limit must be positive".into()));
        }
        if self.escalation.success_marker.is_empty() {
            return Err(ScanError::Config(
                "escalation.success_marker must not be empty".into(),
            ));
        }

        let enumeration = &self.enumeration;
        if enumeration.batch_size == 0 || enumeration.batch_size > MAX_REGISTER_BATCH {
            return Err(ScanError::Range(format!(
                "batch size {} outside 1..={MAX_REGISTER_BATCH}",
                enumeration.batch_size
            )));
        }

        for class in [
            DataClass::HoldingRegister,
            DataClass::InputRegister,
            DataClass::Coil,
            DataClass::DiscreteInput,
        ] {
            validate_spans(class, enumeration.spans(class))?;
        }

        for &coil in &self.write_probe.coils {
            if let Some(span) = enumeration.coils.iter().find(|s| s.contains(coil)) {
                return Err(ScanError::Range(format!(
                    "coil probe {coil} lies inside read span {span}"
                )));
            }
        }
        for &register in &self.write_probe.registers {
            if let Some(span) = enumeration.holding.iter().find(|s| s.contains(register)) {
                return Err(ScanError::Range(format!(
                    "register probe {register} lies inside read span {span}"
                )));
            }
        }

        Ok(())
    }
}

fn validate_spans(class: DataClass, spans: &[AddressRange]) -> Result<(), ScanError> {
    for (i, span) in spans.iter().enumerate() {
        if span.count == 0 {
            return Err(ScanError::Range(format!(
                "{class} span at {} is zero-length",
                span.start
            )));
        }
        if span.last().is_none() {
            return Err(ScanError::Range(format!(
                "{class} span {}+{} runs past address 65535",
                span.start, span.count
            )));
        }
        if let Some(other) = spans[i + 1..].iter().find(|o| o.overlaps(span)) {
            return Err(ScanError::Range(format!(
                "{class} spans {span} and {other} overlap"
            )));
        }
    }
    Ok(())
}
