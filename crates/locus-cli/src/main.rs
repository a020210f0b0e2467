use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use locus_client::BusinessProfileClient;
use locus_cli::{Command, Config};
use locus_core::{
    AppError, CoverResult, DbConfig, HarvestStore, HttpConfig, Marker, PassStatus, Pipeline,
    TracingReporter, TracingWorkerReporter, Trigger, TriggerScheduler, WorkerConfig,
    WorkerService, load_config,
};
use locus_db::{HarvestRepository, TriggerRepository, ensure_schema};

type LocusPipeline = Pipeline<HarvestRepository, BusinessProfileClient, TriggerRepository>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::parse();

    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    info!("Connecting to database...");
    let db_config = DbConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    ensure_schema(&pool)
        .await
        .context("Failed to prepare database schema")?;

    let store = HarvestRepository::new(pool.clone());
    let scheduler = TriggerRepository::new(pool);

    if let Command::Status { logs } = config.command {
        return show_status(&store, &scheduler, logs).await;
    }

    let token = config.access_token.as_deref().ok_or_else(|| {
        anyhow::anyhow!("No access token. Set GBP_ACCESS_TOKEN or pass --access-token")
    })?;
    let api = BusinessProfileClient::with_config(token, HttpConfig::default())?;
    let pipeline = Pipeline::new(store, api, scheduler);

    let cancel = CancellationToken::new();
    spawn_shutdown_handler(cancel.clone());
    let reporter = TracingReporter;

    match config.command {
        Command::Accounts => {
            let count = pipeline.refresh_accounts().await?;
            print_accounts(&pipeline, count).await?;
        }
        Command::Configure => {
            let locus_config = load_config(config.config)?.ok_or_else(|| {
                anyhow::anyhow!(
                    "No configuration file found. Create ~/.config/locus/locus.toml or use --config"
                )
            })?;
            let rows = pipeline.configure(&locus_config).await?;
            info!(
                "Configured {} account(s), retaining {} week(s)",
                rows, locus_config.retention_weeks
            );
            if rows == 0 {
                warn!("No [[accounts]] entries; add some to locus.toml before `locus start`");
            }
        }
        Command::Start => {
            let outcome = pipeline.start(Utc::now(), &cancel, &reporter).await;
            report_outcome(&pipeline, Trigger::YearlyLocationsRetry, outcome).await?;
        }
        Command::Reset => {
            let outcome = pipeline
                .reset_and_restart(Utc::now(), &cancel, &reporter)
                .await;
            report_outcome(&pipeline, Trigger::YearlyLocationsRetry, outcome).await?;
        }
        Command::Tick { trigger } => {
            let outcome = pipeline
                .run_trigger(trigger, Utc::now(), &cancel, &reporter)
                .await;
            report_outcome(&pipeline, trigger, outcome).await?;
        }
        Command::Worker {
            poll_interval,
            worker_id,
        } => {
            let mut worker_config =
                WorkerConfig::default().with_poll_interval(Duration::from_secs(poll_interval));
            if let Some(id) = worker_id {
                worker_config = worker_config.with_worker_id(id);
            }
            let worker = WorkerService::new(pipeline, worker_config);
            worker
                .run(cancel, &TracingWorkerReporter, &reporter)
                .await?;
        }
        Command::Status { .. } => unreachable!("status is handled before the client is built"),
    }

    Ok(())
}

/// Cancels `cancel` on Ctrl+C or SIGTERM. The running slice stops before its
/// next batch.
fn spawn_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("Shutdown signal received, finishing the current batch...");
        cancel.cancel();
    });
}

/// Prints a slice outcome; a failure is written to the audit log before it
/// is returned.
async fn report_outcome(
    pipeline: &LocusPipeline,
    trigger: Trigger,
    outcome: Result<Option<CoverResult>, AppError>,
) -> anyhow::Result<()> {
    match outcome {
        Ok(Some(result)) => {
            print_cover_summary(&result);
            Ok(())
        }
        Ok(None) => {
            info!("Location listing incomplete; armed retries will continue it");
            Ok(())
        }
        Err(e) => {
            if let Err(log_err) = pipeline.record_failure(trigger, &e).await {
                error!(error = %log_err, "Failed to write audit entry");
            }
            Err(anyhow::anyhow!(e.user_message()))
        }
    }
}

fn describe_status(status: &PassStatus) -> String {
    match status {
        PassStatus::Done => "complete".to_string(),
        PassStatus::Suspended(reason) => format!("suspended ({})", reason),
    }
}

fn print_cover_summary(result: &CoverResult) {
    let stats = &result.stats;
    info!("");
    info!("═══════════════════════════════════════════════════════");
    info!("Slice {}", describe_status(&result.status));
    info!("═══════════════════════════════════════════════════════");
    info!("  Windows visited:     {}", stats.windows);
    info!("  Batches:             {}", stats.batches);
    info!("  Records written:     {}", stats.records);
    info!("  Locations advanced:  {}", stats.marked);
    info!("  Locations dropped:   {}", stats.dropped);
    info!("  Batches abandoned:   {}", stats.abandoned);
    info!("═══════════════════════════════════════════════════════");
}

async fn print_accounts(pipeline: &LocusPipeline, count: usize) -> anyhow::Result<()> {
    let accounts = pipeline.store().list_accounts().await?;

    println!("\nAccounts ({})\n", count);
    if accounts.is_empty() {
        println!("  The access token cannot see any account.");
    }
    for account in &accounts {
        println!(
            "  {:<32} {:<22} {}",
            truncate_text(&account.account_name, 32),
            account.name,
            account.account_type.as_deref().unwrap_or("-")
        );
    }
    println!();

    Ok(())
}

async fn show_status(
    store: &HarvestRepository,
    scheduler: &TriggerRepository,
    log_lines: usize,
) -> anyhow::Result<()> {
    let armed = scheduler.armed().await?;
    let configs = store.list_account_configs().await?;
    let retention = store.retention_weeks().await?;
    let stats = store.stats().await?;
    let logs = store.recent_logs(log_lines).await?;

    println!("\nTriggers\n");
    if armed.is_empty() {
        println!("  (none armed)");
    }
    for trigger in &armed {
        println!(
            "  {:<24} next {}  {}",
            trigger.trigger.as_str(),
            trigger.next_run_at.format("%Y-%m-%d %H:%M UTC"),
            trigger.cadence.describe()
        );
    }

    println!("\nConfiguration\n");
    match retention {
        Some(weeks) => println!("  Retention:             {} week(s)", weeks),
        None => println!("  Retention:             not set"),
    }
    for config in &configs {
        println!(
            "  {}. {:<28} {:<20} listing: {}",
            config.position,
            truncate_text(&config.account_name, 28),
            config.account_group,
            marker_label(&config.listing_marker)
        );
    }

    println!("\nProgress\n");
    println!("  Accounts:              {}", stats.accounts);
    println!("  Locations:             {}", stats.locations);
    println!(
        "  Caught up:             {}",
        progress_fraction(stats.caught_locations, stats.locations)
    );
    println!("  Insight rows:          {}", stats.insights);
    println!("  Audit log entries:     {}", stats.log_entries);

    println!("\nRecent log\n");
    for entry in logs.iter().rev() {
        println!(
            "  {}  {}",
            entry.logged_at.format("%Y-%m-%d %H:%M:%S"),
            entry.message
        );
    }
    println!();

    Ok(())
}

fn marker_label(marker: &Marker) -> String {
    match marker {
        Marker::Empty => "-".to_string(),
        other => other.to_string(),
    }
}

fn progress_fraction(done: i64, total: i64) -> String {
    if total == 0 {
        return "0 / 0".to_string();
    }
    let percent = done as f64 * 100.0 / total as f64;
    format!("{} / {} ({:.0}%)", done, total, percent)
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
