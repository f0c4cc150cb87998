//! ISO-8601 timestamps with millisecond precision (e.g. `2025-01-14T07:03:43.273`).
//!
//! Local time, no offset suffix; every logged message carries one.

use chrono::{DateTime, Local};

const ISO_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Current local time as an ISO-8601 string with milliseconds.
pub fn now_iso() -> String {
    format_iso(&Local::now())
}

fn format_iso(t: &DateTime<Local>) -> String {
    t.format(ISO_MILLIS).to_string()
}
