//! # AI News Notifier
//!
//! Watches a Bilibili creator for "AI早报" (AI morning news) uploads, turns
//! each new episode's description into a short bulleted summary, and pushes it
//! to a WeCom group robot webhook.
//!
//! ## Usage
//!
//! ```sh
//! ai_news_notifier --mode run      # poll on a schedule plus the daily push
//! ai_news_notifier --mode check    # one poll-and-notify cycle
//! ai_news_notifier --mode status   # print ledger and schedule status
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: list recent uploads, falling back across endpoint shapes
//! 2. **Selecting**: keyword match, then "published today and not in the ledger"
//!    (or "inside the push window" for the daily push)
//! 3. **Summarizing**: clean the description into at most eight bullets
//! 4. **Notifying**: markdown first, plain text if the webhook refuses it

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod freshness;
mod models;
mod monitor;
mod notify;
mod scheduler;
mod sources;
mod store;
mod summarizer;
mod utils;

use cli::{Cli, Mode};
use config::Settings;
use monitor::NewsMonitor;
use notify::WeComNotifier;
use scheduler::{Job, Scheduler};
use sources::{BilibiliClient, VideoSource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // A missing .env is normal; the process environment still applies.
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    let log_file = init_tracing(&args)?;
    let start_time = std::time::Instant::now();
    info!("{}", "=".repeat(50));
    info!(mode = ?args.mode, log_level = ?args.log_level, log_file = %log_file.display(), "AI news notifier starting");
    info!("{}", "=".repeat(50));

    let settings = match Settings::from_cli(&args) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Environment validation failed; exiting");
            return Err(e.into());
        }
    };
    info!(uid = %settings.uid, offset = %settings.offset, "Environment validation passed");

    let client = BilibiliClient::with_base_url(
        &settings.api_base,
        &settings.uid,
        settings.request_timeout,
        settings.cache(),
    )?;
    let notifier = WeComNotifier::new(settings.webhook_url.clone(), settings.request_timeout)?;
    let monitor = NewsMonitor::new(client, notifier, settings.monitor.clone());
    let now = settings.now();
    let push_at = settings
        .monitor
        .daily_push_enabled
        .then_some(settings.monitor.push_time);

    match settings.mode {
        Mode::Run => {
            info!("Starting in continuous run mode");
            if !monitor.notifier().probe().await {
                error!("Webhook probe failed; check WECHAT_WEBHOOK_URL");
                return Err("webhook probe failed".into());
            }
            if monitor.source().latest_uploads(1).await.is_empty() {
                warn!("Unable to fetch a test upload from Bilibili; continuing");
            }
            let mut scheduler =
                Scheduler::new(settings.monitor.check_interval_minutes, push_at, now);
            scheduler.run(&monitor, settings.offset).await;
        }
        Mode::Check => {
            info!("Running single check");
            let report = monitor.poll_cycle(now).await;
            info!(?report, "Single check finished");
        }
        Mode::Test => {
            info!("Running in test mode");
            monitor.send_test_notification().await;
        }
        Mode::Status => {
            let schedule = Scheduler::new(settings.monitor.check_interval_minutes, push_at, now);
            let status = monitor
                .status(
                    now,
                    schedule.next_run(Job::Poll),
                    schedule.next_run(Job::DailyPush),
                )
                .await;
            println!("\n=== System Status ===\n{status}");
        }
        Mode::Force => {
            info!("Running force mode");
            let delivered = monitor.force_reprocess().await;
            info!(delivered, "Force mode finished");
        }
        Mode::Init => {
            info!("Running initialization mode");
            match monitor.first_time_setup(now).await {
                Ok(report) => info!(?report, "Initialization finished"),
                Err(e) => {
                    error!(path = %settings.monitor.data_dir.display(), error = %e, "Data directory is not writable");
                    return Err(e);
                }
            }
        }
        Mode::Export => {
            let path = monitor.export(now).await?;
            println!("Data exported to: {}", path.display());
        }
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, "Program completed");
    Ok(())
}

/// Log to stdout and to `{log_dir}/ai_news_YYYYMMDD.log`.
///
/// `RUST_LOG` wins over `--log-level` when set.
fn init_tracing(args: &Cli) -> Result<PathBuf, Box<dyn Error>> {
    std::fs::create_dir_all(&args.log_dir)?;
    let log_path = args
        .log_dir
        .join(format!("ai_news_{}.log", Local::now().format("%Y%m%d")));
    let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.directive()));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tfmt::layer()
                .with_target(true)
                .with_timer(UtcTime::rfc_3339()),
        )
        .with(
            tfmt::layer()
                .with_ansi(false)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(log_path)
}
