//! Text normalization helpers shared by the page extractors

use chrono::NaiveDate;

/// Collapses whitespace runs and strips invisible characters
pub fn clean_text(text: &str) -> String {
    text.replace('\u{200b}', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reduces a listed member name to the political name
///
/// Listings render names as `"Full Legal Name - Political Name"`; only the
/// part after the last separator is kept.
pub fn normalize_member_name(name: &str) -> String {
    let name = name.trim();
    let political = match name.rsplit_once(" - ") {
        Some((_, tail)) => tail,
        None => name,
    };
    clean_text(political)
}

/// Parses a count cell from a summary table
///
/// `-` and empty cells mean zero. Cells with decoration keep their first
/// run of digits. Anything without digits is rejected.
pub fn parse_count(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return Some(0);
    }
    if let Ok(value) = text.parse::<u32>() {
        return Some(value);
    }
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Parses a `dd/mm/yyyy` date as printed by the source
pub fn parse_date_br(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%d/%m/%Y").ok()
}
