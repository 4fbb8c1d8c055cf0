//! Blood Cell Classification Service
//!
//! Trains a random forest on leukemia cell images and serves predictions
//! over a small REST API (Axum).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cellscan::api::rest::{create_rest_router, AppState};
use cellscan::config::Config;
use cellscan::dataset::{self, DatasetHandle};
use cellscan::engine::ModelHandle;
use cellscan::service::{ClassifierService, Trainer};

#[derive(Parser, Debug)]
#[command(name = "cellscan", version, about = "Leukemia cell image classifier")]
struct Cli {
    /// Configuration file; built-in defaults are used when it is missing
    #[arg(long, global = true)]
    config: Option<String>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train, check the sample image, then serve (default)
    Run {
        /// Reuse the existing model artifact instead of training
        #[arg(long)]
        skip_training: bool,
    },
    /// Train and write the model artifact
    Train,
    /// Serve an existing model artifact
    Serve,
    /// Classify a single local image
    Predict {
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    info!("Starting Blood Cell Classification Service v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or(Config::default_path());
    let config = Config::load(config_path).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });

    match cli.command.unwrap_or(Command::Run { skip_training: false }) {
        Command::Run { skip_training } => {
            let dataset_root = if skip_training {
                cached_dataset_root(&config)
            } else {
                let summary = Trainer::new(config.clone()).run().await?;
                Some(summary.dataset_root)
            };

            let service = ClassifierService::new(ModelHandle::load(&config.model.artifact_path)?);
            check_sample_image(&config, &service, dataset_root.as_deref());
            serve(&config, service).await
        }
        Command::Train => {
            let summary = Trainer::new(config).run().await?;
            info!(
                "Training finished: {} train / {} validation samples, accuracy {:.3}",
                summary.n_train, summary.n_test, summary.accuracy
            );
            Ok(())
        }
        Command::Serve => {
            let service = ClassifierService::new(ModelHandle::load(&config.model.artifact_path)?);
            serve(&config, service).await
        }
        Command::Predict { image } => {
            let service = ClassifierService::new(ModelHandle::load(&config.model.artifact_path)?);
            let diagnosis = service.predict_file(&image)?;
            info!("Prediction: {}", diagnosis.as_str());
            println!("{}", diagnosis.as_str());
            Ok(())
        }
    }
}

/// Dataset root from an earlier download, without touching the network
fn cached_dataset_root(config: &Config) -> Option<PathBuf> {
    let handle: DatasetHandle = config.dataset.handle.parse().ok()?;
    let cache_root = config
        .dataset
        .cache_dir
        .clone()
        .unwrap_or_else(dataset::download::default_cache_root);
    dataset::download::cached_path(&handle, &cache_root)
}

/// Classify the configured sample image once, as a startup smoke check
fn check_sample_image(config: &Config, service: &ClassifierService, dataset_root: Option<&Path>) {
    let sample = match (dataset_root, &config.dataset.sample_image) {
        (Some(root), Some(sample)) => root.join(sample),
        _ => return,
    };

    if !sample.exists() {
        info!("Sample image not found for testing");
        return;
    }

    match service.predict_file(&sample) {
        Ok(diagnosis) => info!("Prediction: {}", diagnosis.as_str()),
        Err(e) => info!("Sample image check failed: {}", e),
    }
}

async fn serve(config: &Config, service: ClassifierService) -> Result<()> {
    let status = service.model().status();
    info!("Configuration loaded:");
    info!("  Listen: {}:{}", config.server.host, config.server.port);
    info!(
        "  Model: {} ({} trees, {}x{} input)",
        status.path.display(),
        status.n_estimators,
        status.image_size,
        status.image_size
    );
    info!("  CORS origins: {:?}", config.server.cors_origins);

    let app_state = Arc::new(AppState {
        service: Arc::new(service),
        start_time: Instant::now(),
    });
    let rest_router = create_rest_router(
        app_state,
        &config.server.cors_origins,
        config.server.max_upload_mb * 1024 * 1024,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("REST API listening on http://{}", addr);
    info!("Health: http://localhost:{}/health", config.server.port);

    axum::serve(listener, rest_router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received, cleaning up...");
        })
        .await?;

    info!("Goodbye!");
    Ok(())
}
