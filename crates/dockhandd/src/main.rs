use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use dockhand_build::{BuildExecutor, DockerEngine, ExecutorOptions, RegistryAuth, RegistryUrlFormat};
use dockhand_jobs::{MemoryJobStore, QueueOptions};
use dockhandd::{AppState, router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dockhandd")]
#[command(about = "Builds Docker images from uploads and pushes them to a registry", long_about = None)]
struct Cli {
    /// Config file (YAML). Discovered automatically when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Address to listen on
    #[arg(short, long, env = "DOCKHAND_LISTEN")]
    listen: Option<SocketAddr>,
    /// Jobs built in parallel
    #[arg(short, long, env = "DOCKHAND_WORKERS")]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = dockhand_config::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    config.validate()?;

    let registry_url = RegistryUrlFormat::new(config.registry_url_template.clone())?;
    let engine = DockerEngine::connect(RegistryAuth::new(config.registry_server.clone()))
        .context("failed to connect to Docker")?;
    if let Err(e) = engine.ping().await {
        tracing::warn!("Docker daemon is not answering yet: {}", e);
    }

    let executor = BuildExecutor::new(
        Arc::new(engine),
        ExecutorOptions {
            phase_timeout: config.phase_timeout(),
            context_root: config.context_root.clone(),
            registry_url,
        },
    );
    let (queue, pool) = dockhand_jobs::start(
        Arc::new(MemoryJobStore::new()),
        Arc::new(executor),
        QueueOptions {
            workers: config.workers,
            capacity: config.queue_capacity,
            result_ttl: config.result_ttl(),
            sweep_interval: config.sweep_interval(),
        },
    );

    let app = router(AppState::new(queue), config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    println!(
        "{} listening on {} ({} workers)",
        "dockhandd".green().bold(),
        format!("http://{}", config.listen).cyan(),
        config.workers
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Waiting for running jobs to stop");
    pool.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
