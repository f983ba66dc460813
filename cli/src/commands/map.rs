use colored::*;

use crate::rprint;
use crate::terminal::{colors, print};
use relayprobe_common::config::ScanConfig;
use relayprobe_common::report::reading::DataClass;
use relayprobe_protocols::registers::ValueClass;

const CLASSES: [DataClass; 4] = [
    DataClass::HoldingRegister,
    DataClass::InputRegister,
    DataClass::Coil,
    DataClass::DiscreteInput,
];

pub fn map(cfg: &ScanConfig) {
    let enumeration = &cfg.enumeration;

    for (idx, class) in CLASSES.into_iter().enumerate() {
        let spans: Vec<String> = enumeration.spans(class).iter().map(|s| s.to_string()).collect();
        let spans = if spans.is_empty() {
            "not swept".to_string()
        } else {
            spans.join(", ")
        };
        print::tree_head(idx, &format!("{class} [{spans}]"));

        let entries = enumeration.labels.for_class(class);
        if entries.is_empty() {
            print::as_tree_one_level(vec![("labels".to_string(), "none".dimmed())]);
        } else {
            let details = entries
                .iter()
                .map(|entry| {
                    let key = format!("{:>5}", entry.address);
                    (key, describe(class, &entry.label))
                })
                .collect();
            print::as_tree_one_level(details);
        }

        if idx + 1 != CLASSES.len() {
            rprint!();
        }
    }
}

fn describe(class: DataClass, label: &str) -> ColoredString {
    let is_register = matches!(class, DataClass::HoldingRegister | DataClass::InputRegister);
    match ValueClass::from_label(label).scale() {
        Some(scale) if is_register => {
            format!("{} {}", label.color(colors::VALUE), format!("x{scale}").dimmed()).normal()
        }
        _ => label.color(colors::VALUE),
    }
}
