use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wafsift::cli::extract::ExtractArgs;
use wafsift::cli::fetch::FetchArgs;
use wafsift::config::resolve_config_path;

#[derive(Parser)]
#[command(name = "wafsift")]
#[command(about = "Retrieve and unpack AWS WAF logs", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level for wafsift (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List web ACLs and where their logs are sent
    Discover {
        #[arg(long)]
        json: bool,
    },
    /// Download and extract logs for one web ACL
    Fetch {
        /// Web ACL name or id
        #[arg(long, short)]
        resource: String,
        /// Range start: YYYY-MM-DD, YYYY-MM-DDTHH:MMZ or RFC 3339
        #[arg(long)]
        start: Option<String>,
        /// Range end, defaults to now
        #[arg(long)]
        end: Option<String>,
        /// Fetch this much time before the end, e.g. "6h"
        #[arg(long, value_parser = humantime::parse_duration, conflicts_with = "start")]
        last: Option<Duration>,
        /// Download without asking
        #[arg(long, short)]
        yes: bool,
        #[arg(long)]
        json: bool,
    },
    /// Extract records from a local wrapper export
    Extract {
        input: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long)]
        no_validate: bool,
        #[arg(long)]
        pretty: bool,
        /// Pass through objects that are not wrappers
        #[arg(long)]
        auto: bool,
    },
    /// Delete stored files past their retention
    Sweep {
        #[arg(long, value_parser = humantime::parse_duration)]
        older_than: Option<Duration>,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(format!("wafsift={}", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| "wafsift=info".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config_path = config_path.as_deref();

    match cli.command {
        Commands::Discover { json } => {
            wafsift::cli::discover::discover(config_path, json).await?;
        }
        Commands::Fetch {
            resource,
            start,
            end,
            last,
            yes,
            json,
        } => {
            let args = FetchArgs {
                resource,
                start,
                end,
                last,
                yes,
                json,
            };
            wafsift::cli::fetch::fetch(config_path, args).await?;
        }
        Commands::Extract {
            input,
            output,
            no_validate,
            pretty,
            auto,
        } => {
            let args = ExtractArgs {
                input,
                output,
                no_validate,
                pretty,
                auto,
            };
            wafsift::cli::extract::extract(config_path, args)?;
        }
        Commands::Sweep { older_than } => {
            wafsift::cli::sweep::sweep(config_path, older_than).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Init { stdout } => {
                wafsift::cli::config::init(stdout)?;
            }
            ConfigAction::Validate => {
                wafsift::cli::config::validate(config_path)?;
            }
        },
    }

    Ok(())
}
