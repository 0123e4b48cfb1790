// Local wall-clock helpers. Record timestamps are `YYYY-MM-DD HH:MM:SS`
// strings so that lexical order matches chronological order.

use chrono::{Local, NaiveDate, NaiveDateTime};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_timestamp() -> String {
    format_timestamp(Local::now().naive_local())
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
