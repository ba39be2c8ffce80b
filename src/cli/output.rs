//! Operator-facing text for the CLI commands.

use std::fmt::Display;

use rust_decimal::Decimal;

const RULE_WIDTH: usize = 48;

pub fn section(title: &str) {
    println!();
    println!("{title}");
    println!("{}", "─".repeat(RULE_WIDTH));
}

/// One aligned `label value` line.
pub fn key_value(label: &str, value: impl Display) {
    println!("{label:<18} {value}");
}

/// A signed amount, always showing its sign.
pub fn pnl(label: &str, value: Decimal) {
    let sign = if value.is_sign_negative() && !value.is_zero() { "" } else { "+" };
    key_value(label, format!("{sign}{}", value.normalize()));
}

pub fn ok(message: &str) {
    println!("✓ {message}");
}

pub fn warn(message: &str) {
    println!("⚠ {message}");
}

/// Errors go to stderr so scripted callers can separate them.
pub fn error(message: &str) {
    eprintln!("✗ {message}");
}
