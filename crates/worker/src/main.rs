use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use v2t_core::error::CoreError;
use v2t_core::export::ExportFormat;
use v2t_core::status::VideoStatus;
use v2t_db::models::video::VideoListQuery;
use v2t_pipeline::orchestrator::RunRequest;
use v2t_pipeline::store::{PgVideoStore, VideoStore};
use v2t_worker::config::WorkerConfig;
use v2t_worker::dispatcher::JobDispatcher;
use v2t_worker::retention;
use v2t_worker::service::VideoService;

#[derive(Parser)]
#[command(name = "v2t")]
#[command(about = "Extract objects and on-screen text from uploaded videos")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process uploaded videos until interrupted
    Work,
    /// Register a video file for processing
    Upload {
        file: PathBuf,
        /// Name to record instead of the file's own name
        #[arg(long)]
        name: Option<String>,
        /// Process the video right away instead of leaving it to `work`
        #[arg(long)]
        process: bool,
    },
    /// Show the processing status of a video
    Status { id: Uuid },
    /// Print the results of a completed video as JSON
    Results { id: Uuid },
    /// Write an export artifact (txt, pdf, csv, json or all)
    Export { id: Uuid, format: ExportTarget },
    /// Delete a video, its results, source file and frames
    Delete { id: Uuid },
    /// List videos, newest first
    List {
        #[arg(long)]
        status: Option<VideoStatus>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy)]
enum ExportTarget {
    All,
    One(ExportFormat),
}

impl FromStr for ExportTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(ExportTarget::All)
        } else {
            s.parse().map(ExportTarget::One)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env().context("Invalid configuration")?;

    // --- Database ---
    let pool = v2t_db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    v2t_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    v2t_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::debug!("Database ready");

    config
        .layout
        .ensure_dirs()
        .await
        .context("Failed to create storage directories")?;

    let store: Arc<dyn VideoStore> = Arc::new(PgVideoStore::new(pool));
    let service = VideoService::new(Arc::clone(&store), config.layout.clone());

    match cli.command {
        Commands::Work => work(&config, store).await?,
        Commands::Upload { file, name, process } => {
            let video = service.register_upload(&file, name.as_deref()).await?;
            print_json(&video)?;
            if process {
                let orchestrator = v2t_worker::build_orchestrator(&config, store)?;
                let settings = v2t_worker::job_settings(&config);
                let cancel = CancellationToken::new();
                let request = RunRequest {
                    video_id: video.id,
                    source_path: video.storage_path.clone(),
                    interval_secs: settings.interval_secs,
                    confidence_threshold: settings.confidence_threshold,
                };
                let on_signal = cancel.clone();
                let signal = tokio::spawn(async move {
                    shutdown_signal().await;
                    on_signal.cancel();
                });
                let outcome = orchestrator.run(request, &cancel).await;
                signal.abort();
                print_json(&service.status(outcome?.video_id).await?)?;
            }
        }
        Commands::Status { id } => print_json(&service.status(id).await?)?,
        Commands::Results { id } => print_json(&service.results(id).await?)?,
        Commands::Export { id, format } => {
            let now = chrono::Utc::now();
            let artifacts = match format {
                ExportTarget::All => service.export_all(id, now).await?,
                ExportTarget::One(format) => vec![service.export(id, format, now).await?],
            };
            for artifact in artifacts {
                println!("{}", artifact.path.display());
            }
        }
        Commands::Delete { id } => {
            let report = service.delete(id).await?;
            println!("Deleted video {}", report.video.id);
        }
        Commands::List { status, limit, offset } => {
            let query = VideoListQuery { status, limit, offset };
            print_json(&service.list(&query).await?)?;
        }
    }

    Ok(())
}

async fn work(config: &WorkerConfig, store: Arc<dyn VideoStore>) -> anyhow::Result<()> {
    let orchestrator = v2t_worker::build_orchestrator(config, store)?;
    let dispatcher = JobDispatcher::new(
        orchestrator,
        v2t_worker::job_settings(config),
        config.worker_name.clone(),
        config.max_concurrent_jobs,
        config.poll_interval,
    );

    let cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(retention::run(
        config.layout.exports_dir.clone(),
        config.export_retention,
        retention::SWEEP_INTERVAL,
        cancel.clone(),
    ));

    let dispatcher_cancel = cancel.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_cancel).await;
    });

    shutdown_signal().await;
    cancel.cancel();

    dispatcher_handle.await.context("Dispatcher task panicked")?;
    retention_handle.await.context("Retention task panicked")?;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// `RUST_LOG` filters, `LOG_FORMAT=json` switches to JSON lines. Logs go to
/// stderr so command output on stdout stays machine-readable.
fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "v2t=debug,v2t_worker=debug,v2t_pipeline=debug".into()),
        )
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for a termination signal.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
