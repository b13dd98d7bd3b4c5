use super::scanner::{scan, Candidate, ScanOptions};
use crate::config::ExtractionConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::Range;

/// How a decoded top-level object relates to the log record it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapperMode {
    /// Every object is a wrapper; the record is the serialized string held in
    /// the inner field.
    #[default]
    Envelope,
    /// Objects carrying the inner field are unwrapped, any other object is
    /// itself the record.
    Auto,
}

#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub inner_field: String,
    pub pointer_field: String,
    pub timestamp_field: String,
    /// Re-parse the inner string as JSON before emitting it.
    pub validate_inner: bool,
    pub mode: WrapperMode,
    pub scan: ScanOptions,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            inner_field: "@message".to_string(),
            pointer_field: "@ptr".to_string(),
            timestamp_field: "@timestamp".to_string(),
            validate_inner: true,
            mode: WrapperMode::Envelope,
            scan: ScanOptions::default(),
        }
    }
}

impl ExtractionOptions {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            inner_field: config.inner_field.clone(),
            pointer_field: config.pointer_field.clone(),
            timestamp_field: config.timestamp_field.clone(),
            validate_inner: config.validate_inner,
            mode: WrapperMode::Envelope,
            scan: ScanOptions {
                resync_on_line_start: config.resync_on_line_start,
            },
        }
    }

    pub fn with_mode(mut self, mode: WrapperMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Provider metadata lifted from the wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WrapperMeta {
    pub pointer: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    /// The record body was parsed as JSON.
    Parsed,
    /// The wrapper was well-formed but the body was not re-parsed.
    WrapperOnly,
}

/// One inner log entry recovered from a wrapper blob.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    /// Index of the candidate this record came from, in byte order.
    pub candidate: usize,
    /// The record as a single line of JSON text.
    pub body: String,
    pub meta: WrapperMeta,
    pub validity: Validity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Unterminated,
    WrapperDecode,
    InnerNotString,
    InnerDecode,
    EmptyInner,
}

/// Diagnostic for a candidate that was not emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionIssue {
    pub candidate: usize,
    pub range: Range<usize>,
    pub kind: IssueKind,
    pub detail: String,
}

/// Counters for one extraction pass. `emitted + invalid + skipped` always
/// equals `candidates`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionTally {
    pub candidates: u64,
    pub wrapper_decoded: u64,
    pub inner_validated: u64,
    pub emitted: u64,
    pub invalid: u64,
    pub skipped: u64,
}

impl ExtractionTally {
    pub fn merge(&mut self, other: &ExtractionTally) {
        self.candidates += other.candidates;
        self.wrapper_decoded += other.wrapper_decoded;
        self.inner_validated += other.inner_validated;
        self.emitted += other.emitted;
        self.invalid += other.invalid;
        self.skipped += other.skipped;
    }

    /// True when every candidate became a record.
    pub fn is_lossless(&self) -> bool {
        self.invalid == 0 && self.skipped == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    pub records: Vec<ExtractedRecord>,
    pub tally: ExtractionTally,
    pub issues: Vec<ExtractionIssue>,
}

enum Decoded {
    Record(ExtractedRecord),
    Invalid(IssueKind, String),
    Skipped(String),
}

/// Recover the inner log records from a wrapper blob.
///
/// Pure and deterministic: the same input always yields the same ordered
/// records and the same tally. A malformed candidate is counted and skipped;
/// it never aborts the rest of the batch.
pub fn extract(input: &[u8], options: &ExtractionOptions) -> ExtractionOutput {
    let mut output = ExtractionOutput::default();

    for (index, candidate) in scan(input, options.scan).into_iter().enumerate() {
        output.tally.candidates += 1;

        let decoded = if candidate.terminated {
            decode_candidate(index, &candidate, input, options, &mut output.tally)
        } else {
            Decoded::Invalid(
                IssueKind::Unterminated,
                format!("object truncated after {} bytes", candidate.range.len()),
            )
        };

        match decoded {
            Decoded::Record(record) => {
                output.tally.emitted += 1;
                output.records.push(record);
            }
            Decoded::Invalid(kind, detail) => {
                output.tally.invalid += 1;
                output.issues.push(ExtractionIssue {
                    candidate: index,
                    range: candidate.range,
                    kind,
                    detail,
                });
            }
            Decoded::Skipped(detail) => {
                output.tally.skipped += 1;
                output.issues.push(ExtractionIssue {
                    candidate: index,
                    range: candidate.range,
                    kind: IssueKind::EmptyInner,
                    detail,
                });
            }
        }
    }

    output
}

fn decode_candidate(
    index: usize,
    candidate: &Candidate,
    input: &[u8],
    options: &ExtractionOptions,
    tally: &mut ExtractionTally,
) -> Decoded {
    let wrapper: Map<String, Value> = match serde_json::from_slice(candidate.bytes(input)) {
        Ok(map) => map,
        Err(e) => return Decoded::Invalid(IssueKind::WrapperDecode, e.to_string()),
    };
    tally.wrapper_decoded += 1;

    let inner = match wrapper.get(&options.inner_field) {
        Some(Value::String(s)) if s.is_empty() => {
            return Decoded::Skipped(format!("empty {} field", options.inner_field));
        }
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) => {
            return Decoded::Skipped(format!("null {} field", options.inner_field));
        }
        Some(other) => {
            return Decoded::Invalid(
                IssueKind::InnerNotString,
                format!("{} field is {}", options.inner_field, json_type(other)),
            );
        }
        None if options.mode == WrapperMode::Auto => {
            tally.inner_validated += 1;
            return Decoded::Record(ExtractedRecord {
                candidate: index,
                body: Value::Object(wrapper).to_string(),
                meta: WrapperMeta::default(),
                validity: Validity::Parsed,
            });
        }
        None => {
            return Decoded::Skipped(format!("missing {} field", options.inner_field));
        }
    };

    let meta = WrapperMeta {
        pointer: string_field(&wrapper, &options.pointer_field),
        timestamp: string_field(&wrapper, &options.timestamp_field),
    };

    if !options.validate_inner {
        // Raw newlines can only be insignificant whitespace in valid JSON
        let body = if inner.contains(['\n', '\r']) {
            inner.replace(['\n', '\r'], " ")
        } else {
            inner
        };
        return Decoded::Record(ExtractedRecord {
            candidate: index,
            body,
            meta,
            validity: Validity::WrapperOnly,
        });
    }

    match serde_json::from_str::<Value>(&inner) {
        Ok(value) => {
            tally.inner_validated += 1;
            // Keep the provider's bytes unless they would break line framing
            let body = if inner.contains('\n') {
                value.to_string()
            } else {
                inner
            };
            Decoded::Record(ExtractedRecord {
                candidate: index,
                body,
                meta,
                validity: Validity::Parsed,
            })
        }
        Err(e) => Decoded::Invalid(IssueKind::InnerDecode, e.to_string()),
    }
}

fn string_field(map: &Map<String, Value>, name: &str) -> Option<String> {
    map.get(name).and_then(Value::as_str).map(str::to_string)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
