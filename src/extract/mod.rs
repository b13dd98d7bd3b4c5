//! Recovery of JSON log records from wrapper blobs.
//!
//! The scanner finds candidate object spans without trusting any delimiter.
//! The engine decodes each span as a wrapper and the wrapper's inner field as
//! the record, keeping a tally of everything it drops.

mod engine;
mod payload;
mod scanner;

pub use engine::{
    extract, ExtractedRecord, ExtractionIssue, ExtractionOptions, ExtractionOutput,
    ExtractionTally, IssueKind, Validity, WrapperMeta, WrapperMode,
};
pub use payload::{decompress_if_gzip, is_gzip};
pub use scanner::{scan, Candidate, ScanOptions};
