//! Command-line interface definitions.
//!
//! Every option can also come from the environment (a `.env` file is loaded
//! before parsing), so a deployment usually only passes `--mode`.

use crate::sources::bilibili::DEFAULT_BASE_URL;
use crate::store::DEFAULT_MAX_ENTRIES;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// Which top-level action to perform.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Run continuously on a schedule
    Run,
    /// Run one poll-and-notify cycle
    Check,
    /// Send a test notification
    Test,
    /// Print system status
    Status,
    /// Re-send the newest matching uploads, ignoring the ledger
    Force,
    /// Verify the data directory, then run one cycle
    Init,
    /// Write the ledger to a JSON file
    Export,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    #[value(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Command-line arguments for the AI news notifier.
///
/// ```sh
/// # Continuous mode with settings from .env
/// ai_news_notifier
///
/// # One check with verbose logs
/// ai_news_notifier --mode check --log-level DEBUG
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Action to perform
    #[arg(long, value_enum, default_value_t = Mode::Run)]
    pub mode: Mode,

    /// Log verbosity (RUST_LOG takes precedence when set)
    #[arg(long, value_enum, ignore_case = true, env = "LOG_LEVEL", default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// WeCom group robot webhook URL
    #[arg(long, env = "WECHAT_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Bilibili creator id to monitor
    #[arg(long, env = "BILIBILI_UP_UID", default_value = "285286947")]
    pub uid: String,

    /// Bilibili API base URL
    #[arg(long, env = "BILIBILI_API_BASE", default_value = DEFAULT_BASE_URL)]
    pub api_base: String,

    /// Minutes between poll cycles
    #[arg(long, env = "CHECK_INTERVAL", default_value_t = 360)]
    pub check_interval: u64,

    /// Run the once-a-day push in continuous mode
    #[arg(long, env = "ENABLE_DAILY_PUSH", default_value = "true", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub enable_daily_push: bool,

    /// Wall-clock time of the daily push, `HH:MM`
    #[arg(long, env = "DAILY_PUSH_TIME", default_value = "09:30")]
    pub daily_push_time: String,

    /// UTC offset in hours for the daily push and "today"
    #[arg(long, env = "PUSH_TZ_OFFSET_HOURS", default_value_t = 8, allow_negative_numbers = true)]
    pub tz_offset_hours: i32,

    /// Directory for the ledger, marker, cache, and exports
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory for daily log files
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Comma-separated title keywords; defaults to the built-in list
    #[arg(long, env = "NEWS_KEYWORDS", value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// Seconds a cached API response stays fresh; 0 disables the cache
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 300)]
    pub cache_ttl_secs: u64,

    /// Ledger ids kept after each poll cycle
    #[arg(long, env = "LEDGER_MAX_ENTRIES", default_value_t = DEFAULT_MAX_ENTRIES)]
    pub ledger_max_entries: usize,

    /// Record uploads whose notice failed so they are not retried
    #[arg(long, env = "MARK_FAILED_AS_PROCESSED", default_value = "true", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub mark_failed_as_processed: bool,

    /// HTTP timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,
}
