use std::net::SocketAddr;
use std::sync::Arc;

use cadence_core::{CadenceConfig, OsType, TaskCatalog};
use cadence_executor::ShellExecutor;
use cadence_scheduler::SchedulerEngine;
use clap::Parser;
use tracing::{info, warn};

mod app;
mod http;

#[derive(Parser, Debug)]
#[command(name = "cadence-gateway")]
#[command(about = "Schedules catalog tasks and reports their status over HTTP", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to cadence.toml (defaults to ~/.cadence/cadence.toml)
    #[arg(long, env = "CADENCE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cadence_gateway=info,cadence_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    // config: --config > CADENCE_CONFIG > ~/.cadence/cadence.toml
    let cli = Cli::parse();
    let config = CadenceConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        CadenceConfig::default()
    });

    let os = OsType::current();
    let catalog = TaskCatalog::load_or_builtin(config.catalog.path.as_deref())?;
    info!(%os, tasks = catalog.task_names(os).len(), "task catalog ready");

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;

    let engine = Arc::new(SchedulerEngine::new(
        db,
        Arc::new(ShellExecutor::new()),
        config.scheduler.clone(),
    )?);
    engine.start();

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = Arc::new(app::AppState::new(config, Arc::clone(&engine), catalog, os));
    let router = app::build_router(state);

    info!("Cadence gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
