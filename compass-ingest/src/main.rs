use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use compass_core::{CompassConfig, ResumeStore};
use compass_ingest::{read_csv_file, IngestPipeline, IngestProgress, Progress, SilentProgress};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing_subscriber::{fmt, EnvFilter};

const CONNECT_ATTEMPTS: usize = 5;

#[derive(Parser, Debug)]
#[command(author, version, about = "Load a labeled résumé CSV into the store", long_about = None)]
struct Args {
    /// CSV file with Category and Resume columns
    csv: PathBuf,

    #[arg(short, long, default_value = "compass.toml")]
    config: String,

    /// Create the database, extension, table and index if missing
    #[arg(long)]
    setup: bool,

    /// Drop and recreate the table before loading
    #[arg(long, conflicts_with = "setup")]
    recreate: bool,

    #[arg(long)]
    no_progress: bool,
}

struct BarProgress(ProgressBar);

impl IngestProgress for BarProgress {
    fn update(&self, progress: Progress) {
        self.0.set_length(progress.total as u64);
        self.0.set_position(progress.current as u64);
    }
}

fn progress_bar(total: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | {per_sec} | ETA: {eta}")?
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );
    Ok(pb)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match CompassConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    let records = read_csv_file(&args.csv)?;
    tracing::info!(rows = records.len(), path = %args.csv.display(), "Read input");

    let encoder = match compass_core::db::load_encoder(&config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Failed to load encoder: {}", e);
            std::process::exit(1);
        }
    };

    // The database is often still starting when a load is kicked off from compose.
    let retry_strategy = ExponentialBackoff::from_millis(500)
        .max_delay(Duration::from_secs(10))
        .map(jitter)
        .take(CONNECT_ATTEMPTS);
    let prepare = args.setup || args.recreate;
    let store = match Retry::spawn(retry_strategy, || async {
        if prepare {
            if let Err(e) = compass_core::db::ensure_database(&config.database).await {
                tracing::warn!(error = %e, "Could not ensure database exists, retrying");
                return Err(e);
            }
        }
        let store = compass_core::db::open_store(&config).await;
        if let Err(e) = &store {
            tracing::warn!(error = %e, "Database not reachable, retrying");
        }
        store
    })
    .await
    {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.recreate {
        store.recreate_schema().await?;
    } else if args.setup {
        store.ensure_schema().await?;
    }

    let pipeline = IngestPipeline::new(
        encoder,
        store,
        Duration::from_secs(config.embedding.timeout_seconds),
    );

    let report = if args.no_progress {
        pipeline.ingest_records(records, &SilentProgress).await?
    } else {
        let bar = BarProgress(progress_bar(records.len())?);
        let report = pipeline.ingest_records(records, &bar).await;
        bar.0.finish_and_clear();
        report?
    };

    for failure in &report.failures {
        println!(
            "  ✗ row {} ({}): {}",
            failure.index + 1,
            failure.category.as_deref().unwrap_or("?"),
            failure.reason
        );
    }
    println!(
        "Committed {}/{} résumés, {} failed",
        report.committed,
        report.total,
        report.failed()
    );

    if !report.is_complete() {
        std::process::exit(2);
    }
    Ok(())
}
