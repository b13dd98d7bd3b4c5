use std::path::Path;

use console::style;

use super::run::{connect, load};
use super::RunError;
use crate::discovery::{discover as discover_destinations, DiscoveryReport};

pub async fn discover(config_path: Option<&Path>, json: bool) -> Result<(), RunError> {
    let config = load(config_path)?;
    let session = connect(&config).await?;
    let report = discover_destinations(&session.logging_config(), &config.discovery.scopes).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &DiscoveryReport) {
    if report.descriptors.is_empty() {
        println!("{}", style("No web ACLs with logging enabled").yellow());
    }
    for descriptor in &report.descriptors {
        println!(
            "{:<32} {:<10} {:<18} {:<14} {}",
            style(&descriptor.resource.name).cyan(),
            descriptor.scope(),
            descriptor.kind(),
            descriptor.region,
            descriptor.locator
        );
    }
    for warning in &report.warnings {
        eprintln!(
            "{} {}: {}",
            style("warning:").yellow().bold(),
            warning.subject,
            warning.reason
        );
    }
}
