//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use billtracker_core::{IngestionCounts, IngestionService, ProgressReporter, Scheduler};
use billtracker_feed::FeedCache;
use billtracker_shared::{
    AppConfig, config_file_path, database_path, init_config, init_config_at, load_config,
    load_config_from,
};
use billtracker_storage::{SearchFilters, Storage};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// billtracker: ingest and query New Hampshire legislative bills.
#[derive(Parser)]
#[command(
    name = "billtracker",
    version,
    about = "Ingest the NH General Court bill feed into a local searchable database.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.billtracker/billtracker.toml).
    #[arg(long, global = true, env = "BILLTRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one ingestion pass now.
    Ingest,

    /// Assign categories to stored bills that have none.
    Backfill,

    /// Run ingestion and backfill on their schedules until Ctrl-C.
    Run,

    /// Print one bill, with its hearing and docket, as JSON.
    Show {
        /// Bill number, e.g. HB1234.
        number: String,
    },

    /// Most recently updated bills.
    Recent {
        #[arg(short, long, default_value = "20")]
        limit: u32,

        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Search bill numbers, summaries and text.
    Search {
        /// Text to look for. Empty lists bills matching the filters.
        #[arg(default_value = "")]
        query: String,

        /// Only return bills in this category.
        #[arg(short, long)]
        category: Option<String>,

        /// Only return bills whose sponsor contains this text.
        #[arg(short, long)]
        sponsor: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Bill counts per category.
    Categories,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "billtracker=info",
        1 => "billtracker=debug",
        _ => "billtracker=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Ingest => cmd_ingest(config_path).await,
        Command::Backfill => cmd_backfill(config_path).await,
        Command::Run => cmd_run(config_path).await,
        Command::Show { number } => cmd_show(config_path, &number).await,
        Command::Recent { limit, offset } => cmd_recent(config_path, limit, offset).await,
        Command::Search {
            query,
            category,
            sponsor,
            limit,
        } => {
            let filters = SearchFilters { category, sponsor };
            cmd_search(config_path, &query, &filters, limit).await
        }
        Command::Categories => cmd_categories(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Build the ingestion service over a read-write database.
async fn ingestion_service(config: &AppConfig) -> Result<IngestionService> {
    let db_path = database_path(config)?;
    info!(path = %db_path.display(), "opening database");
    let storage = Arc::new(Storage::open(&db_path).await?);
    let cache = Arc::new(FeedCache::new(config.feed.cache_ttl()));
    Ok(IngestionService::from_config(config, storage, cache)?)
}

/// Open the database read-only for queries. It must already exist.
async fn query_storage(config: &AppConfig) -> Result<Storage> {
    let db_path = database_path(config)?;
    if !db_path.exists() {
        return Err(eyre!(
            "no database at '{}'; run `billtracker ingest` first",
            db_path.display()
        ));
    }
    Ok(Storage::open_readonly(&db_path).await?)
}

// ---------------------------------------------------------------------------
// Ingestion commands
// ---------------------------------------------------------------------------

async fn cmd_ingest(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let service = ingestion_service(&config).await?;

    let reporter = CliProgress::new();
    let counts = service.run_ingestion(&reporter).await?;

    println!(
        "Added {} new bills and updated {} bills.",
        counts.new_count, counts.updated_count
    );
    Ok(())
}

async fn cmd_backfill(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let service = ingestion_service(&config).await?;

    let count = service.backfill_categories().await?;
    println!("Categorized {count} bills.");
    Ok(())
}

async fn cmd_run(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let service = Arc::new(ingestion_service(&config).await?);
    let scheduler = Scheduler::new(service, &config.schedule);

    println!(
        "Ingesting every {}h, backfilling categories every {}h. Press Ctrl-C to stop.",
        config.schedule.ingest_interval_hours, config.schedule.backfill_interval_hours
    );
    let stats = scheduler.run().await;

    println!();
    println!("  Ingestion runs: {}", stats.ingestion_runs);
    println!("  Backfill runs:  {}", stats.backfill_runs);
    println!("  Failed runs:    {}", stats.failed_runs);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn entry_enriched(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Enriching [{current}/{total}] {title}"));
    }

    fn done(&self, _counts: &IngestionCounts) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Query commands
// ---------------------------------------------------------------------------

async fn cmd_show(config_path: Option<&Path>, number: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = query_storage(&config).await?;

    let bill = storage
        .get_bill(number)
        .await?
        .ok_or_else(|| eyre!("bill '{number}' not found"))?;
    println!("{}", serde_json::to_string_pretty(&bill)?);
    Ok(())
}

async fn cmd_recent(config_path: Option<&Path>, limit: u32, offset: u32) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = query_storage(&config).await?;

    for bill in storage.list_recent(limit, offset).await? {
        println!(
            "{:<8} {:<16} {}  {}",
            bill.number,
            bill.category.as_deref().unwrap_or("-"),
            bill.last_updated.format("%Y-%m-%d %H:%M"),
            bill.summary
        );
    }
    Ok(())
}

async fn cmd_search(
    config_path: Option<&Path>,
    query: &str,
    filters: &SearchFilters,
    limit: u32,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = query_storage(&config).await?;

    let results = storage.search_bills(query, filters, limit).await?;
    if results.is_empty() {
        println!("No matching bills.");
        return Ok(());
    }
    for result in results {
        println!(
            "{:<8} {:<16} {}",
            result.number,
            result.category.as_deref().unwrap_or("-"),
            result.summary
        );
    }
    Ok(())
}

async fn cmd_categories(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = query_storage(&config).await?;

    for row in storage.category_counts().await? {
        println!(
            "{:>6}  {}",
            row.count,
            row.category.as_deref().unwrap_or("(uncategorized)")
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => {
            init_config_at(path)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let source = match config_path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };
    println!("# {}", source.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
