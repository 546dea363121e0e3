//! Auction statistics CLI
//!
//! Local execution entry point for the crawl and store runs.

use std::path::PathBuf;

use auction_stats::{
    error::{AppError, Result},
    models::Config,
    pipeline,
    services::{AuctionClient, Credentials, notifier_from_config},
    storage::{RunSelector, storage_from_config},
    store::SqliteStore,
};
use clap::{Parser, Subcommand};

/// Court auction statistics harvester
#[derive(Parser, Debug)]
#[command(
    name = "auction-stats",
    version,
    about = "Court auction statistics crawler and store replay"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk the region/usage tree and archive statistics and bid pages
    Crawl {
        /// Who started the run, recorded in the run log
        #[arg(long, default_value = "MANUAL")]
        run_by: String,
    },

    /// Replay an archived run into the relational store
    Store {
        /// `latest` or the unix timestamp of a run start
        #[arg(long)]
        run_id: Option<String>,

        /// Who started the run
        #[arg(long, default_value = "MANUAL")]
        run_by: String,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_on_disk = cli.config.exists();
    let config = Config::load_or_default(&cli.config)?;
    config.validate()?;
    log::info!(
        "Loaded configuration from {} (environment: {})",
        cli.config.display(),
        config.environment.as_str()
    );

    match cli.command {
        Command::Crawl { run_by } => {
            let client = AuctionClient::new(&config.crawler, Credentials::from_env()?)?;
            let storage = storage_from_config(&config.storage).await?;
            let notifier = notifier_from_config(&config.notify)?;

            let outcome = pipeline::run_crawler(
                &config,
                &client,
                storage.as_ref(),
                notifier.as_ref(),
                &run_by,
            )
            .await?;
            log::info!("Crawl {} complete, run log at {}", outcome.run_id, outcome.log_key);
        }

        Command::Store { run_id, run_by } => {
            // Never reset a store from a defaulted environment.
            if !config_on_disk {
                return Err(AppError::config(format!(
                    "store needs a configuration file, {} not found",
                    cli.config.display()
                )));
            }
            let selector = RunSelector::parse(run_id.as_deref().unwrap_or(&config.store.run_id))?;
            let storage = storage_from_config(&config.storage).await?;
            let notifier = notifier_from_config(&config.notify)?;
            let mut store = SqliteStore::open(&config.store.database_path)?;

            let summary = pipeline::run_store(
                &config,
                storage.as_ref(),
                &mut store,
                notifier.as_ref(),
                selector,
                &run_by,
            )
            .await?;
            log::info!("Store complete\n{}", summary.render());
        }

        Command::Validate => {
            log::info!("✓ Config OK");
        }
    }

    Ok(())
}
