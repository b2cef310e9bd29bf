//! School Harvester main entry point
//!
//! This is the command-line interface for the incremental school-directory
//! crawler.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use school_harvester::config::{load_config_with_hash, Config};
use school_harvester::crawler::{fetch_boroughs, Coordinator, Fetcher, RunSummary};
use school_harvester::extract::SchoolsnetExtractor;
use school_harvester::output::{export_store, load_statistics, print_statistics};
use school_harvester::regions::{find_region, select_regions};
use school_harvester::storage::RecordStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// School Harvester: an incremental school-directory crawler
///
/// Crawls the directory region by region, appending one JSON line per school
/// to the record store. Interrupted runs resume where they stopped.
#[derive(Parser, Debug)]
#[command(name = "school-harvester")]
#[command(version)]
#[command(about = "An incremental school-directory crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "harvest.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the configured regions, skipping schools already stored
    Crawl {
        /// Crawl only these regions (overrides `crawl.regions`)
        #[arg(short, long = "region", value_name = "REGION")]
        regions: Vec<String>,

        /// Restrict a single-region crawl to one borough id
        #[arg(short, long, value_name = "ID")]
        borough: Option<String>,
    },

    /// Re-fetch detail fields for stored schools and rewrite the store
    Rescrape {
        /// Only schools stored without detail fields
        #[arg(long)]
        only_missing: bool,
    },

    /// Write the store as CSV into the export directory
    Export {
        /// Write one CSV per region instead of a single file
        #[arg(long)]
        split_by_region: bool,

        /// Export directory (overrides `output.export-dir`)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Drop superseded lines from the store
    Compact,

    /// Show statistics from the store and exit
    Stats,

    /// List the boroughs of a region
    Boroughs {
        /// Region name, e.g. "North West" or north_west
        region: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Crawl { regions, borough } => handle_crawl(config, regions, borough).await,
        Command::Rescrape { only_missing } => handle_rescrape(&config, only_missing).await,
        Command::Export {
            split_by_region,
            out,
        } => handle_export(&config, split_by_region, out),
        Command::Compact => handle_compact(&config),
        Command::Stats => handle_stats(&config),
        Command::Boroughs { region } => handle_boroughs(&config, &region).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("school_harvester=info,warn"),
            1 => EnvFilter::new("school_harvester=debug,info"),
            2 => EnvFilter::new("school_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the crawl command
async fn handle_crawl(
    mut config: Config,
    regions: Vec<String>,
    borough: Option<String>,
) -> anyhow::Result<()> {
    if !regions.is_empty() {
        config.crawl.regions = regions;
    }
    let regions = select_regions(&config.crawl.regions)?;

    let mut coordinator = Coordinator::from_config(&config, SchoolsnetExtractor)?;

    let summary = match borough {
        Some(id) => {
            let [region] = regions.as_slice() else {
                bail!("--borough needs exactly one region, got {}", regions.len());
            };
            let boroughs = fetch_boroughs(coordinator.fetcher(), region).await?;
            let Some(borough) = boroughs.into_iter().find(|b| b.id == id) else {
                bail!("No borough with id {} in {}", id, region);
            };
            tracing::info!("Crawling borough {} ({}) of {}", borough.name, borough.id, region);

            let outcome = coordinator.crawl_region(region, Some(&borough)).await?;
            if let Some(error) = outcome.error {
                return Err(error.into());
            }
            RunSummary {
                budget_exhausted: outcome.budget_exhausted(),
                regions: vec![outcome],
            }
        }
        None => coordinator.run(&regions).await?,
    };

    for outcome in &summary.regions {
        tracing::info!(
            "{}: {} ({} stored of {} listed, {} new)",
            outcome.region,
            outcome.state,
            outcome.stored,
            outcome
                .total
                .map_or_else(|| "?".to_string(), |t| t.to_string()),
            outcome.fetched
        );
    }
    tracing::info!(
        "Crawl finished: {} new schools, {} failed regions, {} schools stored",
        summary.fetched(),
        summary.failed_regions(),
        coordinator.store().len()
    );
    Ok(())
}

/// Handles the rescrape command
async fn handle_rescrape(config: &Config, only_missing: bool) -> anyhow::Result<()> {
    let mut coordinator = Coordinator::from_config(config, SchoolsnetExtractor)?;
    let summary = coordinator.rescrape(only_missing).await?;

    println!(
        "Rescraped {} of {} schools ({} failed, {} untouched)",
        summary.refreshed, summary.total, summary.failed, summary.untouched
    );
    Ok(())
}

/// Handles the export command
fn handle_export(config: &Config, split_by_region: bool, out: Option<PathBuf>) -> anyhow::Result<()> {
    let export_dir = out.unwrap_or_else(|| PathBuf::from(&config.output.export_dir));
    let report = export_store(
        Path::new(&config.output.store_path),
        &export_dir,
        split_by_region,
    )
    .with_context(|| format!("Failed to export {}", config.output.store_path))?;

    println!("=== Export ===\n");
    println!("Records: {}", report.records);
    for file in &report.files {
        println!("  - {}", file.display());
    }
    if report.dropped_fields > 0 {
        println!(
            "Dropped field values (not in header): {}",
            report.dropped_fields
        );
    }
    Ok(())
}

/// Handles the compact command
fn handle_compact(config: &Config) -> anyhow::Result<()> {
    let mut store = RecordStore::open(Path::new(&config.output.store_path))?;
    let (before, after) = store.compact()?;

    println!(
        "Compacted {}: {} lines -> {} records",
        config.output.store_path, before, after
    );
    Ok(())
}

/// Handles the stats command: shows statistics from the store
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Store: {}\n", config.output.store_path);

    let stats = load_statistics(Path::new(&config.output.store_path))?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the boroughs command
async fn handle_boroughs(config: &Config, name: &str) -> anyhow::Result<()> {
    let Some(region) = find_region(name) else {
        bail!("Unknown region: {}", name);
    };

    let fetcher = Fetcher::new(&config.site, &config.fetcher)?;
    let boroughs = fetch_boroughs(&fetcher, &region).await?;

    println!("Boroughs of {} ({}):", region, boroughs.len());
    for borough in &boroughs {
        println!("  {}\t{}", borough.id, borough.name);
    }
    Ok(())
}
