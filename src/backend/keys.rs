//! Object key conventions of firewall log buckets.
//!
//! Delivered files are named like
//! `123456789012_waflogs_eu-west-1_api_20241202T0105Z_d15273e2.log.gz`
//! and live under `.../YYYY/MM/DD/HH/[mm/]`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

const CANDIDATE_SUFFIXES: [&str; 3] = [".gz", ".log", ".json"];

/// Whether a key names a log file rather than a marker or manifest.
pub fn is_log_object(key: &str) -> bool {
    !key.ends_with('/') && CANDIDATE_SUFFIXES.iter().any(|s| key.ends_with(s))
}

/// The timestamp a log file was written for: the `YYYYMMDDTHHMMZ` segment of
/// its file name, or failing that the `YYYY/MM/DD/HH` directories above it.
pub fn object_timestamp(key: &str) -> Option<DateTime<Utc>> {
    let filename = key.rsplit('/').next().unwrap_or(key);
    filename
        .split('_')
        .find_map(parse_compact_timestamp)
        .or_else(|| path_timestamp(key))
}

fn parse_compact_timestamp(segment: &str) -> Option<DateTime<Utc>> {
    let bytes = segment.as_bytes();
    if bytes.len() != 14 || bytes[8] != b'T' || bytes[13] != b'Z' {
        return None;
    }
    NaiveDateTime::parse_from_str(&segment[..13], "%Y%m%dT%H%M")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn path_timestamp(key: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = key.split('/').collect();
    // Directories only; the last part is the file name
    let dirs = parts.len().checked_sub(1)?;

    (0..dirs.saturating_sub(3)).find_map(|i| {
        let year = numeric(parts[i], 4)?;
        let month = numeric(parts[i + 1], 2)?;
        let day = numeric(parts[i + 2], 2)?;
        let hour = numeric(parts[i + 3], 2)?;
        let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
        let naive = date.and_hms_opt(hour, 0, 0)?;
        Some(Utc.from_utc_datetime(&naive))
    })
}

fn numeric(part: &str, len: usize) -> Option<u32> {
    if part.len() == len && part.bytes().all(|b| b.is_ascii_digit()) {
        part.parse().ok()
    } else {
        None
    }
}

/// The part of `key` before its first 4-digit year directory, with a
/// trailing `/`. `None` when the key has no such directory.
pub fn derive_base_prefix(key: &str) -> Option<String> {
    let parts: Vec<&str> = key.split('/').collect();
    let year_at = parts
        .iter()
        .position(|p| p.len() == 4 && p.bytes().all(|b| b.is_ascii_digit()))?;
    if year_at == 0 {
        return None;
    }
    Some(format!("{}/", parts[..year_at].join("/")))
}

/// Longest common prefix of `keys`, cut back to a `/` boundary.
pub fn common_prefix(keys: &[String]) -> String {
    let Some(first) = keys.first() else {
        return String::new();
    };
    let mut len = first.len();
    for key in &keys[1..] {
        len = first
            .bytes()
            .zip(key.bytes())
            .take(len)
            .take_while(|(a, b)| a == b)
            .count();
    }
    match first[..len].rfind('/') {
        Some(slash) => first[..=slash].to_string(),
        None => String::new(),
    }
}
