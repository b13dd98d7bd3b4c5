use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use console::style;
use tracing::warn;

use super::progress::{human_bytes, ProgressReporter};
use super::prompt::PromptPolicy;
use super::run::{connect, load};
use super::time::resolve_range;
use super::RunError;
use crate::backend::{LogQueryService, ObjectStore};
use crate::discovery::{discover, DestinationKind};
use crate::schedule::{
    policy_from_config, AutoApprove, ConfirmationPolicy, Providers, RetrievalSettings,
    RetrievalSummary, Retriever,
};
use crate::sink::LocalSink;

#[derive(Debug, Clone)]
pub struct FetchArgs {
    /// Web ACL name or id.
    pub resource: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub last: Option<Duration>,
    /// Skip the download confirmation.
    pub yes: bool,
    pub json: bool,
}

pub async fn fetch(config_path: Option<&Path>, args: FetchArgs) -> Result<(), RunError> {
    let config = load(config_path)?;
    let range = resolve_range(args.start.as_deref(), args.end.as_deref(), args.last, Utc::now())?;

    let session = connect(&config).await?;
    let report = discover(&session.logging_config(), &config.discovery.scopes).await?;
    let mut matches = report.find(&args.resource);
    let descriptor = matches
        .next()
        .ok_or_else(|| RunError::ResourceNotFound(args.resource.clone()))?;
    if let Some(other) = matches.next() {
        warn!(
            resource = %args.resource,
            using = %descriptor.locator,
            ignored = %other.locator,
            "Resource has several destinations, using the first"
        );
    }

    let providers = match descriptor.kind() {
        DestinationKind::ObjectStore => Providers {
            object_store: Some(Arc::new(session.object_store(&descriptor.region)) as Arc<dyn ObjectStore>),
            log_query: None,
        },
        DestinationKind::LogQueryService => Providers {
            object_store: None,
            log_query: Some(Arc::new(session.log_query(&descriptor.region)) as Arc<dyn LogQueryService>),
        },
    };

    let sink = Arc::new(LocalSink::from_config(&config.sink)?);
    let policy: Box<dyn ConfirmationPolicy> = if args.yes {
        Box::new(AutoApprove)
    } else {
        policy_from_config(&config.retrieval.confirm).unwrap_or_else(|| Box::new(PromptPolicy))
    };
    let settings = RetrievalSettings::from_config(&config.retrieval, &config.extraction);
    let retriever = Retriever::new(providers, sink, policy, settings, session.account_id());

    let reporter = ProgressReporter::spawn(retriever.progress());
    let result = retriever.retrieve(descriptor, range).await;
    reporter.stop().await;
    let summary = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, &config.sink.path);
    }

    if summary.is_hard_failure() {
        return Err(RunError::HardFailure(format!(
            "run deadline passed before any of {} units completed",
            summary.units_planned
        )));
    }
    Ok(())
}

fn print_summary(summary: &RetrievalSummary, sink_root: &Path) {
    println!(
        "{} {} ({}) {}",
        style("Retrieved").green().bold(),
        style(&summary.resource).cyan(),
        summary.destination,
        summary.range
    );
    if summary.range_clamped {
        println!("  range end clamped to now");
    }
    println!(
        "  units: {} planned, {} succeeded, {} failed, {} not started, {} already present",
        summary.units_planned,
        summary.units_succeeded,
        summary.units_failed,
        summary.units_not_started,
        summary.units_skipped_existing
    );
    match summary.destination {
        DestinationKind::ObjectStore => println!(
            "  objects: {} listed ({}), {} downloaded ({}), {} already present",
            summary.objects_listed,
            human_bytes(summary.bytes_listed),
            summary.objects_downloaded,
            human_bytes(summary.bytes_downloaded),
            summary.objects_skipped_existing
        ),
        DestinationKind::LogQueryService => println!("  rows: {}", summary.query_rows),
    }
    if summary.queries_truncated > 0 {
        eprintln!(
            "{} {} queries hit the row limit; rerun with a smaller query chunk",
            style("warning:").yellow().bold(),
            summary.queries_truncated
        );
    }
    let tally = &summary.extraction;
    println!(
        "  records: {} candidates, {} emitted, {} invalid, {} skipped",
        tally.candidates, tally.emitted, tally.invalid, tally.skipped
    );
    println!("  stored under {}", sink_root.display());

    for failure in &summary.failures {
        eprintln!(
            "{} unit {} ({}): {}",
            style("failed:").red().bold(),
            failure.unit,
            failure.target,
            failure.error
        );
    }
}
