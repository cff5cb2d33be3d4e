//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use termforge_core::{EventSink, PipelineEvent};
use termforge_genai::OpenRouterBackend;
use termforge_shared::{
    AppConfig, GapOrder, GenerationConfig, IngestConfig, expand_home, init_config, load_config,
    validate_api_key,
};
use termforge_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// TermForge — bulk glossary ingestion and AI backfill.
#[derive(Parser)]
#[command(
    name = "termforge",
    version,
    about = "Ingest wide tabular glossary workbooks and backfill missing sections via AI backends.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Ingest a tabular source file into content records.
    Ingest {
        /// Path to the workbook (.xlsx) or delimited (.csv) source.
        file: String,

        /// Override the batch flush size (records).
        #[arg(long)]
        batch_records: Option<usize>,
    },

    /// Backfill empty sections of ingested records via the AI backend.
    Generate {
        /// Source file hash to process (defaults to the newest source).
        #[arg(long)]
        source: Option<String>,

        /// Override the budget ceiling in USD.
        #[arg(long)]
        budget: Option<f64>,

        /// Override the worker pool size.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Override the model identifier.
        #[arg(long)]
        model: Option<String>,

        /// Gap processing order: topdown or bottomup.
        #[arg(long)]
        order: Option<String>,
    },

    /// Convert a workbook to delimited text without ingesting it.
    Convert {
        /// Input workbook path.
        input: String,
        /// Output CSV path.
        output: String,
    },

    /// Show ingested sources, checkpoints, jobs, and spend.
    Status,

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
        0 => "termforge=info",
        1 => "termforge=debug",
        _ => "termforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ingest {
            file,
            batch_records,
        } => cmd_ingest(&file, batch_records).await,
        Command::Generate {
            source,
            budget,
            concurrency,
            model,
            order,
        } => cmd_generate(source.as_deref(), budget, concurrency, model.as_deref(), order.as_deref()).await,
        Command::Convert { input, output } => cmd_convert(&input, &output).await,
        Command::Status => cmd_status().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Resolve the pipeline database path from config.
fn db_path(config: &AppConfig) -> PathBuf {
    expand_home(&config.defaults.data_dir).join("termforge.db")
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ingest(file: &str, batch_records: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let path = PathBuf::from(file);
    if !path.exists() {
        return Err(eyre!("source file not found: {file}"));
    }

    let mut ingest_config = IngestConfig::from(&config);
    if let Some(records) = batch_records {
        ingest_config.batch_max_records = records;
    }

    let storage = Storage::open(&db_path(&config)).await?;

    info!(file, "starting ingestion run");
    let progress = CliProgress::new();
    let report =
        termforge_core::run_ingest(&path, &storage, &ingest_config, &progress).await?;
    progress.finish();

    println!();
    println!("  Ingestion complete");
    println!("  Source:       {}", report.source_hash);
    println!("  Strategy:     {}", report.strategy.as_str());
    println!("  Rows read:    {}", report.rows_read);
    println!("  Mapped:       {}", report.rows_mapped);
    println!("  Duplicates:   {}", report.rows_skipped_duplicate);
    println!("  Rejected:     {}", report.rows_rejected);
    println!("  Write errors: {}", report.rows_failed_write);
    println!("  Checkpoint:   {}", report.final_checkpoint_offset);
    println!("  Time:         {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_generate(
    source: Option<&str>,
    budget: Option<f64>,
    concurrency: Option<usize>,
    model: Option<&str>,
    order: Option<&str>,
) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;

    let storage = Arc::new(Storage::open(&db_path(&config)).await?);

    // Default to the most recently ingested source.
    let source_hash = match source {
        Some(hash) => hash.to_string(),
        None => storage
            .list_source_files()
            .await?
            .first()
            .map(|s| s.content_hash.clone())
            .ok_or_else(|| eyre!("no ingested sources found — run `termforge ingest` first"))?,
    };

    let mut generation_config = GenerationConfig::from(&config);
    if let Some(budget) = budget {
        generation_config.budget_ceiling_usd = budget;
    }
    if let Some(concurrency) = concurrency {
        generation_config.concurrency = concurrency.max(1);
    }
    if let Some(model) = model {
        generation_config.default_model = model.to_string();
    }
    if let Some(order) = order {
        generation_config.order = match order {
            "bottomup" => GapOrder::BottomUp,
            _ => GapOrder::TopDown,
        };
    }

    let backend = Arc::new(OpenRouterBackend::from_env(&config.backend)?);

    info!(source_hash = %source_hash, "starting generation run");
    let progress = Arc::new(CliProgress::new());
    let report = termforge_core::run_generation(
        &source_hash,
        storage,
        backend,
        &generation_config,
        config.quality.clone(),
        progress.clone(),
    )
    .await?;
    progress.finish();

    println!();
    println!("  Generation complete");
    println!("  Jobs created:    {}", report.jobs_created);
    println!("  Succeeded:       {}", report.jobs_succeeded);
    println!("  Failed:          {}", report.jobs_failed);
    println!("  Budget-stopped:  {}", report.jobs_budget_exceeded);
    println!("  Flagged:         {}", report.jobs_flagged);
    println!("  Total cost:      ${:.4}", report.total_cost_usd);
    println!("  Time:            {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_convert(input: &str, output: &str) -> Result<()> {
    let input_path = PathBuf::from(input);
    let output_path = PathBuf::from(output);

    let rows =
        termforge_reader::convert_workbook_to_delimited(&input_path, &output_path)?;
    println!("Converted {rows} data rows to {output}");
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&db_path(&config)).await?;

    let sources = storage.list_source_files().await?;
    if sources.is_empty() {
        println!("No sources ingested yet.");
        return Ok(());
    }

    for source in &sources {
        println!("Source {}", source.content_hash);
        println!("  Size:     {} bytes", source.byte_size);
        println!("  Format:   {}", source.format.as_str());
        println!("  Strategy: {}", source.strategy.as_str());
        println!(
            "  Records:  {}",
            storage.count_records(&source.content_hash).await?
        );
        match storage.get_checkpoint(&source.content_hash).await? {
            Some(cp) => println!(
                "  Checkpoint: offset {} ({})",
                cp.last_committed_row_offset,
                cp.status.as_str()
            ),
            None => println!("  Checkpoint: none"),
        }
        println!();
    }

    let job_counts = storage.count_jobs_by_status().await?;
    if !job_counts.is_empty() {
        println!("Generation jobs:");
        for (status, count) in job_counts {
            println!("  {status}: {count}");
        }
    }
    println!("Total spend: ${:.4}", storage.total_cost().await?);

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Created config file at {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let rendered = toml::to_string_pretty(&config)?;
    println!("{rendered}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Event sink rendering pipeline events onto an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl EventSink for CliProgress {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StrategySelected {
                strategy,
                estimated_rows,
                ..
            } => {
                let estimate = estimated_rows
                    .map(|r| format!("~{r} rows"))
                    .unwrap_or_else(|| "unknown size".to_string());
                self.spinner
                    .set_message(format!("Strategy: {} ({estimate})", strategy.as_str()));
            }
            PipelineEvent::RowProcessed { offset } => {
                self.spinner.set_message(format!("Processing row {offset}"));
            }
            PipelineEvent::BatchCommitted {
                records,
                checkpoint_offset,
                ..
            } => {
                self.spinner.set_message(format!(
                    "Committed {records} records, checkpoint at {checkpoint_offset}"
                ));
            }
            PipelineEvent::JobTransition {
                record_key,
                section,
                status,
                ..
            } => {
                self.spinner.set_message(format!(
                    "{record_key}.{section}: {}",
                    status.as_str()
                ));
            }
            PipelineEvent::BudgetExceeded { ceiling_usd, .. } => {
                self.spinner
                    .set_message(format!("Budget ceiling ${ceiling_usd:.2} reached"));
            }
            PipelineEvent::RowSkippedDuplicate { .. } | PipelineEvent::RowRejected { .. } => {}
        }
    }
}
