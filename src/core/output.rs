//! Message printers shared by the subcommands.
//!
//! Every message goes to stdout with a blank line around it; errors are red,
//! confirmations green and secondary details muted.

use colored::*;

/// `✕ Error: <message>` between blank lines.
pub fn print_error(message: &str) {
    println!("\n{} {}\n", "✕ Error:".red(), message.white());
}

/// `✓ <message>` after a blank line.
pub fn print_success(message: &str) {
    println!("\n{} {}", "✓".green(), message.white());
}

pub fn print_info(message: &str) {
    println!("\n{}\n", message.white());
}

/// Title of a listing such as "Modified files".
pub fn print_section_header(header: &str) {
    println!("\n{}:\n", header.white());
}

/// Muted `label: value` line, such as the cache location
pub fn print_detail(label: &str, value: &str) {
    println!("{} {}", format!("{label}:").bright_black(), value.bright_black());
}

/// Trailer of the refresh and scan confirmations.
pub fn change_summary(changes: usize) -> String {
    format!("{changes} status change(s)")
}
