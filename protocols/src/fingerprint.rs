//! Grammar of the relay identification output.
//!
//! Each informative line looks like `"KEY=VALUE","EXTRA"`; everything else
//! (echo, prompts, banners) is noise and is ignored.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use relayprobe_common::error::ScanError;
use relayprobe_common::report::fingerprint::{
    FID_KEY, FIRMWARE_KEY, FingerprintEntry, FingerprintRecord, MODEL_KEY,
};

static LINE_RE: OnceLock<Regex> = OnceLock::new();
static VERSION_RE: OnceLock<Regex> = OnceLock::new();
static MODEL_RE: OnceLock<Regex> = OnceLock::new();

fn line_re() -> &'static Regex {
    LINE_RE.get_or_init(|| {
        Regex::new(r#""([^"=]+)=([^"]+)"\s*,\s*"([^"]*)""#).expect("static fingerprint pattern")
    })
}

fn version_re() -> &'static Regex {
    VERSION_RE.get_or_init(|| Regex::new(r"R\d+-V\d+").expect("static version pattern"))
}

fn model_re() -> &'static Regex {
    MODEL_RE.get_or_init(|| Regex::new(r"^SEL-\d+").expect("static model pattern"))
}

/// Parses one `"KEY=VALUE","EXTRA"` line.
pub fn parse_line(line: &str) -> Result<(String, FingerprintEntry), ScanError> {
    let caps = line_re()
        .captures(line)
        .ok_or_else(|| ScanError::Parse(line.to_string()))?;

    let key = caps[1].trim().to_string();
    let value = caps[2].trim().to_string();
    let extra = Some(caps[3].trim().to_string()).filter(|e| !e.is_empty());

    Ok((key, FingerprintEntry { value, extra }))
}

/// Builds a record from the raw identification output.
///
/// Lines that do not match the grammar are skipped. Parsing the same output
/// twice yields the same record.
pub fn parse_output(output: &str) -> FingerprintRecord {
    let attributes: BTreeMap<String, FingerprintEntry> = output
        .lines()
        .filter_map(|line| parse_line(line).ok())
        .collect();

    let mut model = attributes.get(MODEL_KEY).map(|e| e.value.clone());
    let mut version = attributes.get(FIRMWARE_KEY).map(|e| e.value.clone());

    if version.is_none() {
        if let Some(fid) = attributes.get(FID_KEY) {
            version = version_from_fid(&fid.value);
            if model.is_none() {
                model = model_from_fid(&fid.value);
            }
        }
    }

    FingerprintRecord::probed(attributes, model, version)
}

/// `SEL-787-R110-V1-Z002001-D20190508` → `R110-V1`
pub fn version_from_fid(fid: &str) -> Option<String> {
    version_re().find(fid).map(|m| m.as_str().to_string())
}

/// `SEL-787-R110-V1-Z002001-D20190508` → `SEL-787`
pub fn model_from_fid(fid: &str) -> Option<String> {
    model_re().find(fid.trim()).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID_OUTPUT: &str = "id\r\n\
        \"FID=SEL-787-R110-V1-Z002001-D20190508\",\"0975\"\r\n\
        \"BFID=SLBT-3CF1-R102-V0-Z001001-D20160126\",\"0951\"\r\n\
        \"CID=D3C5\",\"0265\"\r\n\
        \"DEVID=FEEDER 7 XFMR\",\"0573\"\r\n\
        \"PARTNO=0787E2XCA1A4X5X81000230\",\"0779\"\r\n\
        =>";

    #[test]
    fn derives_model_and_version_from_fid() {
        let record = parse_output(ID_OUTPUT);
        assert_eq!(record.model.as_deref(), Some("SEL-787"));
        assert_eq!(record.version.as_deref(), Some("R110-V1"));
        assert_eq!(record.get("CID"), Some("D3C5"));
        assert_eq!(record.get("DEVID"), Some("FEEDER 7 XFMR"));
        assert_eq!(
            record.attributes.get("FID").and_then(|e| e.extra.as_deref()),
            Some("0975")
        );
        assert_eq!(record.attributes.len(), 5);
    }

    #[test]
    fn explicit_keys_win_over_fid() {
        let output = "\"MODEL=SEL351\",\"x\"\n\"FW=2.0\",\"y\"\n\"FID=SEL-787-R110-V1-Z002001-D20190508\",\"z\"";
        let record = parse_output(output);
        assert_eq!(record.model.as_deref(), Some("SEL351"));
        assert_eq!(record.version.as_deref(), Some("2.0"));
    }

    #[test]
    fn explicit_model_is_kept_when_version_comes_from_fid() {
        let output = "\"MODEL=SEL-751A\",\"\"\n\"FID=SEL-787-R110-V1-Z002001-D20190508\",\"z\"";
        let record = parse_output(output);
        assert_eq!(record.model.as_deref(), Some("SEL-751A"));
        assert_eq!(record.version.as_deref(), Some("R110-V1"));
        assert_eq!(record.attributes.get("MODEL").and_then(|e| e.extra.clone()), None);
    }

    #[test]
    fn noise_yields_an_empty_record() {
        let record = parse_output("Invalid command\r\n=>\r\n");
        assert!(record.is_empty());
        assert!(matches!(parse_line("=>"), Err(ScanError::Parse(_))));
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parse_output(ID_OUTPUT), parse_output(ID_OUTPUT));
    }

    #[test]
    fn fid_without_version_token() {
        assert_eq!(version_from_fid("SEL-787-Z002001"), None);
        assert_eq!(model_from_fid("XYZ-SEL-787"), None);
    }
}
