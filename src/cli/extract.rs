use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use console::style;
use tracing::debug;

use super::run::load;
use super::RunError;
use crate::extract::{decompress_if_gzip, extract as extract_records, ExtractionOptions, WrapperMode};

#[derive(Debug, Clone)]
pub struct ExtractArgs {
    pub input: PathBuf,
    /// Write records here instead of stdout.
    pub output: Option<PathBuf>,
    pub no_validate: bool,
    pub pretty: bool,
    /// Treat objects without the inner field as records themselves.
    pub auto: bool,
}

/// Run the extraction engine over a local export, writing one record per
/// line and the tally to stderr.
pub fn extract(config_path: Option<&Path>, args: ExtractArgs) -> Result<(), RunError> {
    let config = load(config_path)?;
    let mut options = ExtractionOptions::from_config(&config.extraction);
    if args.no_validate {
        options.validate_inner = false;
    }
    if args.auto {
        options.mode = WrapperMode::Auto;
    }

    let raw = std::fs::read(&args.input)?;
    let payload = decompress_if_gzip(&raw)?;
    let output = extract_records(&payload, &options);

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    for record in &output.records {
        if args.pretty {
            match serde_json::from_str::<serde_json::Value>(&record.body) {
                Ok(value) => serde_json::to_writer_pretty(&mut writer, &value)?,
                Err(_) => writer.write_all(record.body.as_bytes())?,
            }
        } else {
            writer.write_all(record.body.as_bytes())?;
        }
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    for issue in &output.issues {
        debug!(candidate = issue.candidate, kind = ?issue.kind, detail = %issue.detail, "Candidate dropped");
    }

    let tally = &output.tally;
    eprintln!(
        "{} candidates, {} wrapper-decoded, {} inner-validated, {} emitted, {} invalid, {} skipped",
        tally.candidates,
        tally.wrapper_decoded,
        tally.inner_validated,
        tally.emitted,
        tally.invalid,
        tally.skipped
    );
    if !tally.is_lossless() {
        eprintln!(
            "{} {} candidates were dropped; rerun with RUST_LOG=wafsift=debug for details",
            style("warning:").yellow().bold(),
            tally.invalid + tally.skipped
        );
    }
    Ok(())
}
