// Per-day record identifiers: `YYYYMMDD` followed by a zero-padded sequence.
//
// Allocation is a pure scan over the identifiers already issued for the day;
// callers own the id space (documents and bookmarks never share one) and any
// serialization between concurrent allocations.

use chrono::{Local, NaiveDate};

/// Format a date as the `YYYYMMDD` identifier prefix.
pub fn day_prefix(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Sequence number carried by `id` under `prefix`.
///
/// Only the leading ASCII digits of the suffix count, so `2024010105-copy`
/// still yields `5`. Returns `None` when the prefix does not match or no
/// digit follows it.
pub fn sequence_of(id: &str, prefix: &str) -> Option<u64> {
    let tail = id.strip_prefix(prefix)?;
    let digits = tail.bytes().take_while(u8::is_ascii_digit).count();
    tail[..digits].parse().ok()
}

/// One past the largest sequence found under `prefix`, starting at 1.
pub fn next_sequence<'a, I>(prefix: &str, existing: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    existing
        .into_iter()
        .filter_map(|id| sequence_of(id, prefix))
        .max()
        .unwrap_or(0)
        .saturating_add(1)
}

/// Join a prefix and a sequence, padding the sequence to at least two digits.
pub fn format_id(prefix: &str, sequence: u64) -> String {
    format!("{prefix}{sequence:02}")
}

/// Next identifier for `date` given the identifiers already issued.
pub fn allocate_on<'a, I>(date: NaiveDate, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = day_prefix(date);
    let sequence = next_sequence(&prefix, existing);
    format_id(&prefix, sequence)
}

/// Next identifier for today in the local time zone.
pub fn allocate<'a, I>(existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    allocate_on(Local::now().date_naive(), existing)
}

/// `count` consecutive identifiers for `date`, used by bulk imports.
pub fn allocate_batch<'a, I>(date: NaiveDate, existing: I, count: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = day_prefix(date);
    let first = next_sequence(&prefix, existing);
    (0..count as u64).map(|offset| format_id(&prefix, first.saturating_add(offset))).collect()
}
