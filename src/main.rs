//! `cpmp-applyd` binary entrypoint: parses CLI args, loads runtime config,
//! opens the database, and dispatches to the requested apply mode.

use clap::Parser;
use cpmp_core::admin_client::HttpAdminClient;
use cpmp_core::apply::{apply, reapply_latest_snapshot};
use cpmp_core::cli::{ApplyArgs, Cli, Command};
use cpmp_core::db;
use cpmp_core::runtime_config;
use cpmp_core::SystemClock;
use eyre::{Result, WrapErr};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc::unbounded_channel, Mutex};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .pretty()
        .init();

    let invocation = Cli::parse();

    match invocation.command {
        Command::Apply(args) => run_apply_once(&args).await,
        Command::Watch(args) => run_watch(&args).await,
        Command::Rollback(args) => run_rollback(&args).await,
    }
}

async fn run_apply_once(args: &ApplyArgs) -> Result<()> {
    let config = runtime_config::load(&args.config).await.wrap_err("failed to load runtime config")?;
    let pool = db::init_db(&config.database.path).await.wrap_err("failed to open database")?;
    let admin_client = HttpAdminClient::new(config.admin_api.base_url.clone());
    let clock = SystemClock;
    let lock = Mutex::new(());

    apply(
        &pool,
        &admin_client,
        &clock,
        &config.database.config_dir,
        &config.database.storage_dir(),
        config.apply.snapshot_retention,
        &lock,
    )
    .await
    .wrap_err("apply failed")?;

    info!("apply succeeded");
    Ok(())
}

async fn run_rollback(args: &ApplyArgs) -> Result<()> {
    let config = runtime_config::load(&args.config).await.wrap_err("failed to load runtime config")?;
    let admin_client = HttpAdminClient::new(config.admin_api.base_url.clone());

    reapply_latest_snapshot(&admin_client, &config.database.config_dir)
        .await
        .map_err(eyre::Report::new)
        .wrap_err("rollback failed")?;

    info!("rolled back to latest snapshot");
    Ok(())
}

async fn run_watch(args: &ApplyArgs) -> Result<()> {
    let app_config =
        runtime_config::load(&args.config).await.wrap_err("failed to load runtime config")?;
    let pool = db::init_db(&app_config.database.path).await.wrap_err("failed to open database")?;
    let admin_client = HttpAdminClient::new(app_config.admin_api.base_url.clone());
    let clock = SystemClock;
    let lock = Mutex::new(());

    info!("running initial apply before watching for changes");
    if let Err(err) = apply(
        &pool,
        &admin_client,
        &clock,
        &app_config.database.config_dir,
        &app_config.database.storage_dir(),
        app_config.apply.snapshot_retention,
        &lock,
    )
    .await
    {
        error!("initial apply failed: {err}");
    }

    let (raw_tx, mut raw_rx) = unbounded_channel::<Event>();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        },
        notify::Config::default(),
    )
    .wrap_err("failed to create database file watcher")?;
    watcher
        .watch(&app_config.database.path, RecursiveMode::NonRecursive)
        .wrap_err("failed to watch database file")?;

    info!("watching {} for changes", app_config.database.path.display());
    while let Some(event) = raw_rx.recv().await {
        if !matches!(event.kind, EventKind::Modify(_)) {
            continue;
        }

        tokio::time::sleep(std::time::Duration::from_millis(app_config.apply.watch_debounce_ms)).await;
        while raw_rx.try_recv().is_ok() {}

        info!("database changed, reapplying");
        if let Err(err) = apply(
            &pool,
            &admin_client,
            &clock,
            &app_config.database.config_dir,
            &app_config.database.storage_dir(),
            app_config.apply.snapshot_retention,
            &lock,
        )
        .await
        {
            error!("apply failed: {err}");
        }
    }

    Ok(())
}
