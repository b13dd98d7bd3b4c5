use chrono::{DateTime, Utc};

use crate::schedule::TimeRange;

const TS_FORMAT: &str = "%Y%m%dT%H%MZ";

/// Builds sink keys of the form `account/resource/YYYY-MM-DD/HH/file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    account: String,
    resource: String,
}

impl KeySpace {
    pub fn new(account: &str, resource: &str) -> Self {
        Self {
            account: segment(account),
            resource: segment(resource),
        }
    }

    /// `account/resource/`, the parent of every key in this space.
    pub fn root(&self) -> String {
        format!("{}/{}/", self.account, self.resource)
    }

    fn hour_dir(&self, ts: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}",
            self.account,
            self.resource,
            ts.format("%Y-%m-%d/%H")
        )
    }

    /// Where an object store file lands, under its own file name.
    pub fn raw_object(&self, ts: DateTime<Utc>, object_key: &str) -> String {
        format!("{}/{}", self.hour_dir(ts), segment(basename(object_key)))
    }

    pub fn object_records(&self, ts: DateTime<Utc>, object_key: &str) -> String {
        let name = basename(object_key);
        let stem = name.strip_suffix(".gz").unwrap_or(name);
        format!("{}/{}.records.ndjson", self.hour_dir(ts), segment(stem))
    }

    fn unit_stem(&self, kind: &str, bounds: &TimeRange) -> String {
        format!(
            "{}/{}_{}_{}",
            self.hour_dir(bounds.start),
            kind,
            bounds.start.format(TS_FORMAT),
            bounds.end.format(TS_FORMAT)
        )
    }

    /// Manifest of one object-store unit.
    pub fn object_manifest(&self, bounds: &TimeRange) -> String {
        format!("{}.manifest.json", self.unit_stem("objects", bounds))
    }

    /// Raw result rows from one poll of a query.
    pub fn query_part(&self, bounds: &TimeRange, part: usize) -> String {
        format!("{}.part{:04}.json", self.unit_stem("query", bounds), part)
    }

    pub fn query_records(&self, bounds: &TimeRange, part: usize) -> String {
        format!("{}.part{:04}.records.ndjson", self.unit_stem("query", bounds), part)
    }

    pub fn query_manifest(&self, bounds: &TimeRange) -> String {
        format!("{}.manifest.json", self.unit_stem("query", bounds))
    }
}

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Make a value safe to use as one path segment.
fn segment(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" => "_".to_string(),
        "." | ".." => cleaned.replace('.', "_"),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_object_keys() {
        let keys = KeySpace::new("123456789012", "api");
        let ts = Utc.with_ymd_and_hms(2024, 12, 2, 1, 5, 0).unwrap();
        let object = "AWSLogs/123456789012/WAFLogs/ap-southeast-1/api/2024/12/02/01/05/123456789012_waflogs_ap-southeast-1_api_20241202T0105Z_d15273e2.log.gz";

        assert_eq!(
            keys.raw_object(ts, object),
            "123456789012/api/2024-12-02/01/123456789012_waflogs_ap-southeast-1_api_20241202T0105Z_d15273e2.log.gz"
        );
        assert_eq!(
            keys.object_records(ts, object),
            "123456789012/api/2024-12-02/01/123456789012_waflogs_ap-southeast-1_api_20241202T0105Z_d15273e2.log.records.ndjson"
        );
    }

    #[test]
    fn test_query_keys() {
        let keys = KeySpace::new("123456789012", "site");
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap();
        let bounds = TimeRange::new(start, start + chrono::Duration::hours(6)).unwrap();

        assert_eq!(
            keys.query_part(&bounds, 2),
            "123456789012/site/2025-03-01/06/query_20250301T0600Z_20250301T1200Z.part0002.json"
        );
        assert_eq!(
            keys.query_manifest(&bounds),
            "123456789012/site/2025-03-01/06/query_20250301T0600Z_20250301T1200Z.manifest.json"
        );
        assert_eq!(
            keys.object_manifest(&bounds),
            "123456789012/site/2025-03-01/06/objects_20250301T0600Z_20250301T1200Z.manifest.json"
        );
    }

    #[test]
    fn test_segments_are_sanitized() {
        let keys = KeySpace::new("", "../evil/name");
        assert_eq!(keys.root(), "_/.._evil_name/");
        let keys = KeySpace::new("acct", "..");
        assert_eq!(keys.root(), "acct/__/");
    }
}
