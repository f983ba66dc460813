use colored::Color;

pub const PRIMARY: Color = Color::TrueColor { r: 120, g: 200, b: 160 };
pub const ACCENT: Color = Color::TrueColor { r: 240, g: 190, b: 90 };
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;

pub const HOST: Color = Color::TrueColor { r: 110, g: 170, b: 240 };
pub const LABEL: Color = Color::TrueColor { r: 170, g: 170, b: 200 };
pub const VALUE: Color = Color::BrightWhite;

pub const PASS: Color = Color::Green;
pub const INFO: Color = Color::Cyan;
pub const WARN: Color = Color::Yellow;
pub const CRITICAL: Color = Color::Red;
