//! Colour scheme for status badges in CLI output.
//!
//! Every badge takes the colour of the record's dominant flag, so a file that
//! is both added and modified shows up green like any other addition.
//!
//! # Color Scheme
//! - **Conflict**: red bold
//! - **Removed/Deleted**: red
//! - **Added/Copied**: green
//! - **Modified**: yellow
//! - **New (untracked)**: cyan
//! - **Remote changes**: blue
//! - **Excluded/Not managed**: bright black

use crate::core::status::{StatusFlags, StatusRecord};
use colored::*;

/// Colour function for the dominant flag of `record`
pub fn status_color_style(record: StatusRecord) -> Box<dyn Fn(&str) -> ColoredString> {
    match record.status.dominant() {
        StatusFlags::CONFLICT => Box::new(|text: &str| text.red().bold()),
        StatusFlags::MERGE => Box::new(|text: &str| text.magenta()),
        StatusFlags::DELETED_LOCALLY | StatusFlags::REMOVED_LOCALLY => Box::new(|text: &str| text.red()),
        StatusFlags::ADDED_LOCALLY | StatusFlags::COPIED_LOCALLY => Box::new(|text: &str| text.green()),
        StatusFlags::MODIFIED_LOCALLY => Box::new(|text: &str| text.yellow()),
        StatusFlags::NEW_LOCALLY => Box::new(|text: &str| text.cyan()),
        StatusFlags::REMOVED_IN_REPOSITORY
        | StatusFlags::NEW_IN_REPOSITORY
        | StatusFlags::MODIFIED_IN_REPOSITORY => Box::new(|text: &str| text.blue()),
        StatusFlags::EXCLUDED | StatusFlags::NOT_MANAGED => Box::new(|text: &str| text.bright_black()),
        _ => Box::new(|text: &str| text.normal()),
    }
}

/// Badge padded to a fixed width so paths line up
pub fn aligned_label(record: StatusRecord) -> ColoredString {
    let color_fn = status_color_style(record);
    color_fn(&format!("{:<2}", record.label()))
}

pub fn colored_path(record: StatusRecord, path: &str) -> ColoredString {
    let color_fn = status_color_style(record);
    color_fn(path)
}

/// One listing line: badge, path and description
pub fn format_status_line(record: StatusRecord, path: &str) -> String {
    let suffix = if record.is_directory { "/" } else { "" };
    format!(
        "  {} {}{}  {}",
        aligned_label(record),
        colored_path(record, path),
        suffix,
        format!("({})", record.description()).bright_black()
    )
}
