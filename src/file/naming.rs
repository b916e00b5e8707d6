//! Recording file names.

use chrono::{DateTime, TimeZone};

const EXTENSION: &str = ".mid";
const APPEND_MARKER: &str = "-append-";

/// Name for a new recording started at `now`: `YYYYMMDD-HHMMSS.mid`, with a
/// `-2`, `-3`, ... suffix while the name is taken.
pub fn default_name<Tz>(now: &DateTime<Tz>, exists: impl Fn(&str) -> bool) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let stem = now.format("%Y%m%d-%H%M%S").to_string();
    let mut name = format!("{stem}{EXTENSION}");
    let mut n = 2u32;
    while exists(&name) {
        name = format!("{stem}-{n}{EXTENSION}");
        n += 1;
    }
    name
}

/// Name for a recording appended to `source`.
///
/// `<base>-append-<n>.mid` continues at `n + 1`; any other name starts a
/// counter at 1. The counter keeps going until the name is free.
pub fn append_name(source: &str, exists: impl Fn(&str) -> bool) -> String {
    let (base, mut n) = split_append_counter(source);
    loop {
        let name = format!("{base}{APPEND_MARKER}{n}{EXTENSION}");
        if !exists(&name) {
            return name;
        }
        n += 1;
    }
}

fn split_append_counter(source: &str) -> (&str, u64) {
    let stem = source.strip_suffix(EXTENSION).unwrap_or(source);
    if let Some((base, counter)) = stem.rsplit_once(APPEND_MARKER) {
        let is_counter = !counter.is_empty() && counter.bytes().all(|b| b.is_ascii_digit());
        if is_counter && source.ends_with(EXTENSION) {
            if let Ok(n) = counter.parse::<u64>() {
                return (base, n.saturating_add(1));
            }
        }
    }
    (stem, 1)
}
