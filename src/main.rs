//! StockSync command line interface
//!
//! Single binary with ad-hoc subcommand dispatch: `sync`, `status`, `logs`,
//! `watchdog` and `migrate`. Configuration lives in the user config
//! directory and credentials may come from the environment.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use stocksync_lib::domain::sync_log::{SyncLog, SyncRunStatus, SyncType};
use stocksync_lib::infrastructure::{
    init_logging_with_config, log_system_info, AppConfig, ConfigManager, DatabaseConnection,
    InventoryRepository, SyncLogRepository, UpstreamClient,
};
use stocksync_lib::sync::{SyncError, SyncOrchestrator, SyncRequest, Watchdog};

struct App {
    config: AppConfig,
    repository: InventoryRepository,
    sync_logs: SyncLogRepository,
}

/// Load config, bring up logging and open the migrated database
async fn bootstrap() -> Result<App> {
    let manager = ConfigManager::new()?;
    let mut config = manager.initialize_on_first_run().await?;
    config.apply_env_overrides();

    init_logging_with_config(config.logging.clone())?;

    let db_path = ConfigManager::resolve_database_path(&config)?;
    let database_url = format!("sqlite://{}", db_path.display());
    let db = DatabaseConnection::new(&database_url).await?;
    db.migrate().await?;

    Ok(App {
        repository: InventoryRepository::new(db.pool().clone()),
        sync_logs: SyncLogRepository::new(db.pool().clone()),
        config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("sync") => cmd_sync(&args[1..]).await,
        Some("status") => cmd_status(&args[1..]).await,
        Some("logs") => cmd_logs(&args[1..]).await,
        Some("watchdog") => cmd_watchdog(&args[1..]).await,
        Some("migrate") => cmd_migrate().await,
        None | Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("Unknown command: {other}")
        }
    }
}

async fn cmd_sync(args: &[String]) -> Result<()> {
    let Some(type_arg) = args.first() else {
        print_usage();
        bail!("sync requires a type: inventory | vendors | purchase_orders | full");
    };
    let sync_type =
        SyncType::parse(type_arg).with_context(|| format!("Unknown sync type: {type_arg}"))?;

    let mut request = SyncRequest::new(sync_type);
    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--full-resync" => request.full_resync = true,
            "--replace-all" => request.replace_all = true,
            "--priority-only" => request.priority_only = true,
            "--dry-run" => request.dry_run = true,
            "--since" => {
                let value = iter
                    .next()
                    .context("--since needs an RFC 3339 timestamp")?;
                let since = DateTime::parse_from_rfc3339(value)
                    .with_context(|| format!("Invalid --since timestamp: {value}"))?;
                request.filter_since = Some(since.with_timezone(&Utc));
            }
            other => bail!("Unknown sync option: {other}"),
        }
    }

    let app = bootstrap().await?;
    let client = UpstreamClient::new(app.config.upstream.clone())?;
    let orchestrator = SyncOrchestrator::new(
        Arc::new(client),
        app.repository,
        app.sync_logs,
        app.config.sync.clone(),
        app.config.upstream.page_size,
    );

    match orchestrator.run(&request).await {
        Ok(log) => {
            if request.dry_run {
                println!("🔍 Dry run: nothing was written");
            }
            println!("{}", describe_log(&log));
            for failure in log.errors.iter().take(5) {
                println!("   ❌ {}: {}", failure.identifier, failure.message);
            }
            if log.errors.len() > 5 {
                println!("   … and {} more", log.errors.len() - 5);
            }

            if log.status == SyncRunStatus::Error {
                bail!("{} sync ended in error", log.sync_type);
            }
            Ok(())
        }
        Err(SyncError::AlreadyRunning { sync_type }) => {
            bail!("A conflicting sync is already running for {sync_type}; see `stocksync status`")
        }
        Err(err) => Err(err.into()),
    }
}

async fn cmd_status(args: &[String]) -> Result<()> {
    let types: Vec<SyncType> = match args.first() {
        Some(arg) => {
            vec![SyncType::parse(arg).with_context(|| format!("Unknown sync type: {arg}"))?]
        }
        None => vec![
            SyncType::Inventory,
            SyncType::Vendors,
            SyncType::PurchaseOrders,
            SyncType::Full,
        ],
    };

    let app = bootstrap().await?;
    for sync_type in types {
        let running = app.sync_logs.get_running_run(sync_type).await?;
        let last = app.sync_logs.get_latest_terminal_run(sync_type).await?;

        println!("📊 {}", sync_type);
        match running {
            Some(log) => println!(
                "   running since {} ({} processed, {} errors so far)",
                fmt_time(log.started_at),
                log.items_processed,
                log.errors.len()
            ),
            None => println!("   idle"),
        }
        match last {
            Some(log) => println!("   last: {}", describe_log(&log)),
            None => println!("   last: never run"),
        }
    }
    Ok(())
}

async fn cmd_logs(args: &[String]) -> Result<()> {
    let limit: u32 = match args.first() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("logs limit must be a number, got: {raw}"))?,
        None => 20,
    };

    let app = bootstrap().await?;
    let logs = app.sync_logs.get_recent_logs(limit).await?;
    if logs.is_empty() {
        println!("No sync runs recorded yet");
        return Ok(());
    }

    for log in logs {
        println!("{}", describe_log(&log));
    }
    Ok(())
}

async fn cmd_watchdog(args: &[String]) -> Result<()> {
    let mut interval_override: Option<u64> = None;
    let mut once = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--once" => once = true,
            "--interval" => {
                let value = iter.next().context("--interval needs seconds")?;
                interval_override = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid --interval value: {value}"))?,
                );
            }
            other => bail!("Unknown watchdog option: {other}"),
        }
    }

    let app = bootstrap().await?;
    let watchdog = Watchdog::new(
        app.sync_logs.clone(),
        app.config.sync.stale_run_threshold_seconds,
        interval_override.unwrap_or(app.config.sync.watchdog_interval_seconds),
    );

    if once {
        let expired = watchdog.sweep().await?;
        println!("✅ Watchdog sweep complete: {} stale run(s) expired", expired);
        return Ok(());
    }

    log_system_info();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal.cancel();
        }
    });

    watchdog.run(shutdown).await
}

async fn cmd_migrate() -> Result<()> {
    let app = bootstrap().await?;
    let db_path = ConfigManager::resolve_database_path(&app.config)?;
    println!("✅ Database schema is up to date: {}", db_path.display());
    Ok(())
}

fn describe_log(log: &SyncLog) -> String {
    let duration = log
        .duration_ms
        .map(|ms| format!(" in {}ms", ms))
        .unwrap_or_default();

    format!(
        "{}  {:<15} {:<8} {} processed ({} inserted, {} updated, {} skipped, {} errors){}",
        fmt_time(log.started_at),
        log.sync_type.to_string(),
        log.status.to_string(),
        log.items_processed,
        log.items_inserted,
        log.items_updated,
        log.items_skipped,
        log.errors.len(),
        duration
    )
}

fn fmt_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn print_usage() {
    println!("StockSync - upstream inventory sync engine");
    println!();
    println!("USAGE:");
    println!("    stocksync <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    sync <type> [--full-resync] [--replace-all] [--since <RFC3339>]");
    println!("                [--priority-only] [--dry-run]");
    println!("                     Run a sync; type is one of: inventory, vendors,");
    println!("                     purchase_orders, full");
    println!("    status [type]    Show the running and most recent run per type");
    println!("    logs [n]         Show the n most recent runs (default 20)");
    println!("    watchdog [--interval <secs>] [--once]");
    println!("                     Expire stale runs, once or on an interval");
    println!("    migrate          Create or update the local database schema");
    println!();
    println!("ENVIRONMENT:");
    println!("    STOCKSYNC_API_KEY     Overrides the configured upstream API key");
    println!("    STOCKSYNC_API_SECRET  Overrides the configured upstream API secret");
}
