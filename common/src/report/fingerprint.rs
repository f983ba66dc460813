use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const MODEL_KEY: &str = "MODEL";
pub const FIRMWARE_KEY: &str = "FW";
pub const FID_KEY: &str = "FID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub value: String,
    pub extra: Option<String>,
}

/// Where the model/version information came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintSource {
    /// Parsed from the relay's identification output.
    Probed,
    /// Supplied by the operator instead of probing.
    Assumed,
}

/// Identification attributes of one relay.
///
/// `model` and `version` are the derived fields consumed downstream (CVE
/// correlation keys on `model`). They are fixed at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub attributes: BTreeMap<String, FingerprintEntry>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub source: FingerprintSource,
}

impl FingerprintRecord {
    pub fn probed(
        attributes: BTreeMap<String, FingerprintEntry>,
        model: Option<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            attributes,
            model,
            version,
            source: FingerprintSource::Probed,
        }
    }

    pub fn assumed(model: Option<String>, version: Option<String>) -> Self {
        let mut attributes = BTreeMap::new();
        for (key, value) in [(MODEL_KEY, &model), (FIRMWARE_KEY, &version)] {
            if let Some(value) = value {
                attributes.insert(
                    key.to_string(),
                    FingerprintEntry {
                        value: value.clone(),
                        extra: None,
                    },
                );
            }
        }
        Self {
            attributes,
            model,
            version,
            source: FingerprintSource::Assumed,
        }
    }

    pub fn empty() -> Self {
        Self::probed(BTreeMap::new(), None, None)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.model.is_none() && self.version.is_none()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|entry| entry.value.as_str())
    }
}
