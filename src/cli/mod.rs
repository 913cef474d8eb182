pub mod backfill;
pub mod doctor;
pub mod items;
pub mod review;
pub mod search;
pub mod stats;

use chrono::{DateTime, Utc};
use indicatif::ProgressStyle;

use gre_mentor::srs::ReviewItem;

/// One-line summary of an item for listings.
pub(crate) fn item_line(item: &ReviewItem) -> String {
    let due = item
        .next_due
        .map(|d| format_due(&d))
        .unwrap_or_else(|| "new".to_string());
    let definition = item
        .definition
        .as_deref()
        .map(|d| format!(" - {}", truncate(d, 60)))
        .unwrap_or_default();
    format!("{}  {:<10}  {}{}", item.id, due, item.term, definition)
}

pub(crate) fn format_due(due: &DateTime<Utc>) -> String {
    due.format("%Y-%m-%d").to_string()
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

pub(crate) fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}
