//! `YYYY-MM-DD` calendar dates on the wire.

use serde::Serializer;
use time::{format_description::FormatItem, macros::format_description, Date};

const FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parse a calendar date. A full ISO timestamp is accepted and truncated to its date.
pub fn parse(text: &str) -> Option<Date> {
    let text = text.trim();
    let day = match text.get(10..11) {
        Some("T") | Some(" ") => &text[..10],
        _ => text,
    };
    Date::parse(day, FORMAT).ok()
}

pub fn format(date: &Date) -> String {
    // The format only has numeric components, which cannot fail for a valid Date.
    date.format(FORMAT).unwrap_or_default()
}

pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format(date))
}
