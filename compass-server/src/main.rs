use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use compass_core::{CompassConfig, ResumeStore, SimilarityQueryService};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use compass_server::http::{start_http_server, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "compass.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match CompassConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    // Connect to DB
    let store = match compass_core::db::open_store(&config).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };
    let pool = store.pool().clone();

    if args.health {
        match compass_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        match compass_core::db::check_pgvector(&pool).await {
            Ok(v) => println!("✅ pgvector version: {}", v),
            Err(e) => {
                println!("❌ pgvector check failed: {}", e);
                std::process::exit(1);
            }
        }

        match store.count().await {
            Ok(n) => println!("✅ {} résumés stored", n),
            Err(e) => {
                println!("❌ résumé table unreadable: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Career Compass health check passed");
        return Ok(());
    }

    if let Err(e) = store.ensure_schema().await {
        eprintln!("Failed to prepare schema: {}", e);
        std::process::exit(1);
    }

    // Model load failure is fatal; there is no degraded mode without an encoder
    let encoder = match compass_core::db::load_encoder(&config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Failed to load encoder: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(model = encoder.model_name(), "Encoder loaded");

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let search = SimilarityQueryService::new(
        encoder,
        store,
        Duration::from_secs(config.embedding.timeout_seconds),
    );
    let state = Arc::new(HttpState {
        search,
        pool: Some(pool),
        config,
    });

    start_http_server(state, tx.subscribe()).await
}
