use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harvester::config::Config;
use harvester::error::{Error, HarvesterErrorTrait};

mod commands;

use commands::App;

#[derive(Parser)]
#[command(
    name = "harvester",
    version,
    about = "Quota-bounded eBay completed-listing harvester",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync category trees for every configured site
    Sync,

    /// Plan the day's rounds and enqueue jobs
    Schedule {
        /// Seed for end-time sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Consume queued jobs until Ctrl-C
    Work {
        /// Jobs processed in parallel
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Serve /metrics and /health on this address
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },

    /// Resolve a category to its top-level ancestor
    Resolve {
        /// Marketplace site, e.g. EBAY-US
        site: String,

        /// Category id
        category: String,
    },

    /// Show planned and actual request counts
    Quota {
        /// Quota day (YYYY-MM-DD), today when omitted
        #[arg(long)]
        day: Option<NaiveDate>,
    },

    /// Export sold listings to CSV
    Export {
        /// Output file path
        #[arg(short, long, default_value = "output.csv")]
        output: PathBuf,
    },

    /// List distinct listing observation times
    Times,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    if let Err(e) = setup_tracing(&log_format, &config.logging.level, cli.verbose) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{e:#}");
            match Error::find_in(&e) {
                Some(cause) => {
                    tracing::error!(
                        error = %message,
                        category = cause.category().label(),
                        recoverable = cause.is_recoverable(),
                        "Command failed"
                    );
                    eprintln!("Error: {message}");
                    ExitCode::from(exit_status(cause))
                }
                None => {
                    tracing::error!(error = %message, "Command failed");
                    eprintln!("Error: {message}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Transient failures exit with EX_TEMPFAIL so a cron wrapper can retry
fn exit_status(err: &Error) -> u8 {
    if err.is_recoverable() {
        75
    } else {
        1
    }
}

async fn run(command: Commands, config: Config) -> Result<()> {
    let app = App::new(config)?;

    match command {
        Commands::Sync => {
            tracing::info!(sites = ?app.config.marketplace.sites, "Starting sync command");
            commands::sync(&app).await
        }

        Commands::Schedule { seed } => {
            tracing::info!(seed = ?seed, "Starting schedule command");
            commands::schedule(&app, seed).await
        }

        Commands::Work {
            concurrency,
            metrics_addr,
        } => {
            tracing::info!(
                concurrency = ?concurrency,
                metrics_addr = ?metrics_addr,
                "Starting work command"
            );
            commands::work(
                &app,
                commands::WorkParams {
                    concurrency,
                    metrics_addr,
                },
            )
            .await
        }

        Commands::Resolve { site, category } => commands::resolve(&app, &site, &category).await,

        Commands::Quota { day } => commands::quota(&app, day).await,

        Commands::Export { output } => {
            tracing::info!(output = %output.display(), "Starting export command");
            commands::export(&app, &output).await
        }

        Commands::Times => commands::times(&app).await,
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::from_env().context("Failed to load config from environment"),
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("harvester=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(format!("harvester={level},warn")))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
