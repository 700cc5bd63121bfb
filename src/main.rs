//! Social post normalizer CLI
//!
//! Reads a crawl export (JSON array or NDJSON), maps every post through the
//! platform schema, writes normalized records partitioned by upload date and
//! publishes one media batch event per run.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use social_normalizer::config::Config;
use social_normalizer::media::{self, table, MediaBatchEvent};
use social_normalizer::metrics;
use social_normalizer::pipeline::{BatchOutcome, BatchProcessor, BatchRequest, Outputs, PipelineConfig};
use social_normalizer::schema::SchemaRegistry;
use social_normalizer::sink::{NdjsonAnalyticsSink, NdjsonMediaPublisher};
use social_normalizer::CrawlMetadata;

/// Social post normalizer - schema-driven mapping and media batching
#[derive(Parser, Debug)]
#[command(name = "social-normalizer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Normalizes multi-platform social posts and batches their media")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,

    /// Schema directory (overrides SCHEMA_DIR)
    #[arg(long, global = true)]
    schema_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    #[arg(long, default_value = "")]
    crawl_id: String,

    #[arg(long, default_value = "")]
    snapshot_id: String,

    #[arg(long, default_value = "")]
    competitor: String,

    #[arg(long, default_value = "")]
    brand: String,

    #[arg(long, default_value = "")]
    category: String,

    /// Crawl timestamp; defaults to now
    #[arg(long)]
    crawl_date: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Map a crawl export and deliver records and media
    Process {
        /// Platform (facebook, tiktok, youtube)
        #[arg(short, long)]
        platform: String,

        /// Input file: JSON array or one JSON object per line
        #[arg(short, long)]
        input: PathBuf,

        /// Schema version; latest when omitted
        #[arg(long)]
        version: Option<String>,

        #[command(flatten)]
        crawl: CrawlArgs,

        /// Worker count (overrides WORKER_COUNT)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Output directory (overrides OUTPUT_DIR)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output format (json, summary)
        #[arg(short, long, default_value = "summary")]
        output: String,
    },

    /// List and validate stored schemas
    Schemas {
        /// Only this platform
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Print the media batch event for an export without writing anything
    Classify {
        #[arg(short, long)]
        platform: String,

        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        crawl: CrawlArgs,
    },
}

/// Generates a new correlation ID for the session
fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Sets up structured logging with tracing
fn setup_logging(log_level: &str, json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs);

    let correlation_id = generate_correlation_id();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        correlation_id = %correlation_id,
        "Starting social normalizer"
    );

    let mut config = Config::load()?;
    if let Some(dir) = cli.schema_dir {
        config.schema_dir = dir;
    }

    match cli.command {
        Commands::Process {
            platform,
            input,
            version,
            crawl,
            workers,
            output_dir,
            output,
        } => {
            if let Some(workers) = workers {
                config.worker_count = workers;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            config.validate()?;
            let version = version.or_else(|| config.schema_version.clone());
            process(&config, &platform, &input, version, crawl, &output).await?;
        }

        Commands::Schemas { platform } => {
            config.validate()?;
            list_schemas(&config, platform.as_deref())?;
        }

        Commands::Classify { platform, input, crawl } => {
            config.validate()?;
            classify_only(&config, &platform, &input, crawl).await?;
        }
    }

    if let Some(path) = config.metrics_path() {
        metrics::write_metrics_file(path).await?;
    }

    Ok(())
}

impl CrawlArgs {
    fn into_metadata(self) -> CrawlMetadata {
        let now = Utc::now().to_rfc3339();
        CrawlMetadata {
            crawl_id: self.crawl_id,
            snapshot_id: self.snapshot_id,
            competitor: self.competitor,
            brand: self.brand,
            category: self.category,
            crawl_date: self.crawl_date.unwrap_or_else(|| now.clone()),
            processed_date: now,
        }
    }
}

/// Reads a JSON array or newline-delimited JSON objects
async fn read_records(path: &Path) -> Result<Vec<Value>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if text.trim_start().starts_with('[') {
        let records: Vec<Value> = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a JSON array", path.display()))?;
        return Ok(records);
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("{}:{} is not valid JSON", path.display(), n + 1))
        })
        .collect()
}

/// Runs one batch end to end
async fn process(
    config: &Config,
    platform: &str,
    input: &Path,
    version: Option<String>,
    crawl: CrawlArgs,
    output_format: &str,
) -> Result<()> {
    let records = read_records(input).await?;
    let metadata = crawl.into_metadata();

    info!(
        platform = %platform,
        input = %input.display(),
        records = records.len(),
        crawl_id = %metadata.crawl_id,
        "Starting batch"
    );

    let registry = Arc::new(SchemaRegistry::from_dir(&config.schema_dir));
    let processor = BatchProcessor::new(registry, PipelineConfig::from_config(config)?);

    let outcome = processor
        .process(BatchRequest {
            platform: platform.to_string(),
            version,
            records,
            metadata: metadata.clone(),
        })
        .await?;

    let outputs = Outputs {
        records: Arc::new(NdjsonAnalyticsSink::new(config.output_dir.join("records"))),
        quarantine: Some(Arc::new(NdjsonAnalyticsSink::new(&config.quarantine_dir))),
        media: Arc::new(NdjsonMediaPublisher::new(config.output_dir.join("events"), &config.media_topic)),
    };
    let delivery = processor.deliver(&outcome, &metadata, &outputs, Utc::now()).await?;

    for failure in &outcome.failures {
        warn!(index = failure.index, reason = %failure.reason, "Record skipped");
    }

    match output_format {
        "json" => {
            let json = serde_json::json!({
                "report": outcome.report,
                "delivery": delivery,
                "failures": outcome.failures,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => print_summary(&outcome),
    }

    Ok(())
}

fn print_summary(outcome: &BatchOutcome) {
    let report = &outcome.report;
    println!("\nBatch Summary");
    println!("=============");
    println!("Platform:          {} (schema v{})", report.platform, report.schema_version);
    println!("Records:           {}", report.total);
    println!("Processed:         {}", report.processed);
    println!("Validation failed: {}", report.validation_failed);
    println!("Record errors:     {}", report.record_errors);
    println!("Duplicates:        {}", report.duplicates);
    println!("Quarantined:       {}", report.quarantined);
    println!("Dropped:           {}", report.dropped);
    println!("Field errors:      {}", report.field_errors);

    let counts = &outcome.media.counts;
    println!("\nMedia ({} items, {} posts):", report.media_items, outcome.media.posts_with_media);
    println!("  - videos:         {}", counts.videos);
    println!("  - images:         {}", counts.images);
    println!("  - profile_images: {}", counts.profile_images);
    println!("  - banners:        {}", counts.banners);
}

/// Lists stored schemas, loading each one so broken documents surface
fn list_schemas(config: &Config, platform: Option<&str>) -> Result<()> {
    let registry = SchemaRegistry::from_dir(&config.schema_dir);

    let schemas = match platform {
        Some(platform) => {
            let mut versions = registry.store().list_versions(platform)?;
            versions.sort();
            versions
                .iter()
                .map(|v| registry.load(platform, v))
                .collect::<social_normalizer::Result<Vec<_>>>()?
        }
        None => registry.preload()?,
    };

    println!("\n{:<12} {:<10} {:>9} {:>9} {:>10}", "Platform", "Version", "Mappings", "Computed", "Min score");
    println!("{}", "-".repeat(54));
    for schema in &schemas {
        let summary = schema.summary();
        println!(
            "{:<12} {:<10} {:>9} {:>9} {:>10.2}",
            summary.platform, summary.version, summary.field_mappings, summary.computed_fields, summary.minimum_score
        );
    }
    println!("\nTotal: {} schemas in {}", schemas.len(), config.schema_dir.display());

    Ok(())
}

/// Classifies media only and prints the event that would be published
async fn classify_only(config: &Config, platform: &str, input: &Path, crawl: CrawlArgs) -> Result<()> {
    let base = table::for_platform(platform)
        .with_context(|| format!("No media extraction table for platform {platform}"))?;
    let table = match config.video_bytes_per_second {
        Some(bps) => base.with_video_bytes_per_second(bps),
        None => base.clone(),
    };

    let records = read_records(input).await?;
    let post_count = records.len();
    let items: Vec<_> = records.iter().flat_map(|r| media::classify(r, &table)).collect();
    let batch = media::group(items, table.platform, post_count);

    let event = MediaBatchEvent::new(batch, &crawl.into_metadata(), Utc::now(), config.max_parallel_downloads);
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}
