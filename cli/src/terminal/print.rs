use colored::*;
use tracing::info;
use unicode_width::UnicodeWidthStr;

use crate::terminal::colors;

pub const TOTAL_WIDTH: usize = 64;
pub const PRINT_TARGET: &str = "relayprobe::print";

#[macro_export]
macro_rules! rprint {
    () => {
        $crate::terminal::print::print("");
    };
    ($msg:expr) => {
        $crate::terminal::print::print($msg);
    };
}

/// Emits one line of report output, bypassing the level filter.
pub fn print(msg: &str) {
    info!(target: PRINT_TARGET, raw_msg = msg);
}

fn rule(glyph: &str, width: usize) -> ColoredString {
    glyph.repeat(width).color(colors::SEPARATOR)
}

/// `left` and `right` padding that centres `text` on a full-width line.
fn centring(text: &str) -> (usize, usize) {
    let spare = TOTAL_WIDTH.saturating_sub(console::measure_text_width(text));
    (spare / 2, spare - spare / 2)
}

pub fn banner(q_level: u8) {
    if q_level > 0 {
        return;
    }

    let title = format!("⟦ RELAYPROBE v{} ⟧", env!("CARGO_PKG_VERSION"));
    let (left, right) = centring(&title);
    print(&format!(
        "{}{}{}",
        rule("═", left),
        title.color(colors::PRIMARY).bold(),
        rule("═", right)
    ));
}

pub fn header(msg: &str, q_level: u8) {
    if q_level > 0 {
        return;
    }

    let title = format!("⟦ {} ⟧", msg.to_uppercase());
    let (left, right) = centring(&title);
    print(&format!(
        "{}{}{}",
        rule("─", left),
        title.color(colors::PRIMARY),
        rule("─", right)
    ));
}

pub fn fat_separator() {
    print(&rule("═", TOTAL_WIDTH).to_string());
}

/// A `>`-prefixed status line, used for live progress.
pub fn print_status<T: AsRef<str>>(msg: T) {
    print(&format!(
        "{} {}",
        ">".color(colors::SEPARATOR),
        msg.as_ref().color(colors::TEXT_DEFAULT)
    ));
}

pub fn tree_head(idx: usize, name: &str) {
    print(&format!(
        "{}{}{} {}",
        "[".color(colors::SEPARATOR),
        idx.to_string().color(colors::ACCENT),
        "]".color(colors::SEPARATOR),
        name.color(colors::HOST).bold()
    ));
}

pub fn subtree_head(name: &str) {
    print(&format!(" {} {}", "■".color(colors::ACCENT), name.color(colors::PRIMARY)));
}

/// Prints `key: value` pairs as one tree level, keys padded to the longest.
pub fn as_tree_one_level(details: Vec<(String, ColoredString)>) {
    let key_width = details
        .iter()
        .map(|(key, _)| UnicodeWidthStr::width(key.as_str()))
        .max()
        .unwrap_or(0);

    let count = details.len();
    for (i, (key, value)) in details.into_iter().enumerate() {
        let branch = if i + 1 < count { "├─" } else { "└─" };
        let dots = key_width.saturating_sub(UnicodeWidthStr::width(key.as_str())) + 1;
        print(&format!(
            "   {} {}{}{} {}",
            branch.color(colors::SEPARATOR),
            key.color(colors::LABEL),
            ".".repeat(dots).color(colors::SEPARATOR),
            ":".color(colors::SEPARATOR),
            value
        ));
    }
}

pub fn centerln(msg: &str) {
    let (left, _) = centring(msg);
    print(&format!("{}{}", " ".repeat(left), msg));
}
