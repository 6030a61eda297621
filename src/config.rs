//! Validated runtime settings built from the parsed [`Cli`].

use crate::cli::{Cli, Mode};
use crate::error::ConfigError;
use crate::monitor::MonitorSettings;
use crate::notify::wecom::validate_webhook_url;
use crate::sources::DEFAULT_KEYWORDS;
use crate::store::ResponseCache;
use crate::utils::parse_hhmm;
use chrono::{DateTime, FixedOffset, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const LEDGER_FILE: &str = "processed_videos.txt";
const MARKER_FILE: &str = "daily_push_marker.txt";
const CACHE_DIR: &str = "cache";
const ITEM_PAUSE: Duration = Duration::from_secs(2);
const FORCE_LIMIT: usize = 3;
const MAX_INTERVAL_MINUTES: u64 = 366 * 24 * 60;

#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: Mode,
    /// Empty only in modes that never send.
    pub webhook_url: String,
    pub uid: String,
    pub api_base: String,
    pub offset: FixedOffset,
    pub request_timeout: Duration,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub monitor: MonitorSettings,
}

impl Settings {
    /// Validate `cli` into settings.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for a missing or placeholder webhook (except in the
    /// status and export modes) and for any out-of-range value.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let needs_webhook = !matches!(cli.mode, Mode::Status | Mode::Export);
        let webhook_url = cli.webhook_url.clone().unwrap_or_default();
        if needs_webhook {
            if webhook_url.trim().is_empty() {
                return Err(ConfigError::Missing("WECHAT_WEBHOOK_URL"));
            }
            validate_webhook_url(&webhook_url).map_err(|e| ConfigError::Invalid {
                var: "WECHAT_WEBHOOK_URL",
                reason: e.to_string(),
            })?;
        }

        let uid = cli.uid.trim().to_string();
        if uid.is_empty() {
            return Err(ConfigError::Missing("BILIBILI_UP_UID"));
        }
        if !uid.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                var: "BILIBILI_UP_UID",
                reason: format!("{uid:?} is not numeric"),
            });
        }

        if cli.check_interval == 0 || cli.check_interval > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::Invalid {
                var: "CHECK_INTERVAL",
                reason: format!("must be between 1 and {MAX_INTERVAL_MINUTES} minutes"),
            });
        }

        let push_time = parse_hhmm(&cli.daily_push_time).ok_or_else(|| ConfigError::Invalid {
            var: "DAILY_PUSH_TIME",
            reason: format!("{:?} is not HH:MM", cli.daily_push_time),
        })?;

        let offset = (-12..=14)
            .contains(&cli.tz_offset_hours)
            .then(|| FixedOffset::east_opt(cli.tz_offset_hours * 3600))
            .flatten()
            .ok_or_else(|| ConfigError::Invalid {
                var: "PUSH_TZ_OFFSET_HOURS",
                reason: format!("{} is outside -12..=14", cli.tz_offset_hours),
            })?;

        if cli.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "REQUEST_TIMEOUT_SECS",
                reason: "must be positive".into(),
            });
        }
        if cli.ledger_max_entries == 0 {
            return Err(ConfigError::Invalid {
                var: "LEDGER_MAX_ENTRIES",
                reason: "must be positive".into(),
            });
        }

        let mut keywords: Vec<String> = cli
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            keywords = DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect();
        }
        debug!(?keywords, "Resolved title keywords");

        let data_dir = cli.data_dir.clone();
        let monitor = MonitorSettings {
            keywords,
            creator_label: uid.clone(),
            ledger_path: data_dir.join(LEDGER_FILE),
            marker_path: data_dir.join(MARKER_FILE),
            data_dir: data_dir.clone(),
            check_interval_minutes: cli.check_interval,
            daily_push_enabled: cli.enable_daily_push,
            push_time,
            max_ledger_entries: cli.ledger_max_entries,
            mark_failed_as_processed: cli.mark_failed_as_processed,
            item_pause: ITEM_PAUSE,
            force_limit: FORCE_LIMIT,
        };

        Ok(Self {
            mode: cli.mode,
            webhook_url,
            uid,
            api_base: cli.api_base.clone(),
            offset,
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
            cache_dir: data_dir.join(CACHE_DIR),
            cache_ttl: Duration::from_secs(cli.cache_ttl_secs),
            monitor,
        })
    }

    /// The response cache, unless the TTL is zero.
    pub fn cache(&self) -> Option<ResponseCache> {
        (!self.cache_ttl.is_zero()).then(|| ResponseCache::new(&self.cache_dir, self.cache_ttl))
    }

    /// The current instant in the configured offset.
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const HOOK: &str = "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=abc";

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["ai_news_notifier"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn defaults_resolve() {
        let s = Settings::from_cli(&parse(&[
            "--webhook-url",
            HOOK,
            "--uid",
            "285286947",
            "--daily-push-time",
            "09:30",
            "--tz-offset-hours",
            "8",
            "--data-dir",
            "data",
            "--cache-ttl-secs",
            "300",
        ]))
        .unwrap();
        assert_eq!(s.offset, FixedOffset::east_opt(8 * 3600).unwrap());
        assert_eq!(s.monitor.ledger_path, PathBuf::from("data/processed_videos.txt"));
        assert_eq!(s.monitor.marker_path, PathBuf::from("data/daily_push_marker.txt"));
        assert_eq!(s.monitor.item_pause, Duration::from_secs(2));
        assert_eq!(s.monitor.force_limit, 3);
        assert!(s.cache().is_some());
        assert!(!s.monitor.keywords.is_empty());
    }

    #[test]
    fn placeholder_webhook_fails_outside_status() {
        let bad = "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=YOUR_BOT_KEY";
        let err = Settings::from_cli(&parse(&["--mode", "run", "--webhook-url", bad])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "WECHAT_WEBHOOK_URL", .. }));

        assert!(Settings::from_cli(&parse(&["--mode", "status", "--webhook-url", bad])).is_ok());
        assert!(Settings::from_cli(&parse(&["--mode", "export", "--webhook-url", ""])).is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let base = ["--webhook-url", HOOK];
        let with = |extra: &[&str]| {
            let mut args = base.to_vec();
            args.extend_from_slice(extra);
            Settings::from_cli(&parse(&args))
        };
        assert!(with(&["--daily-push-time", "9h30"]).is_err());
        assert!(with(&["--tz-offset-hours", "15"]).is_err());
        assert!(with(&["--check-interval", "0"]).is_err());
        assert!(with(&["--uid", "juya"]).is_err());
        assert!(with(&["--request-timeout-secs", "0"]).is_err());
    }

    #[test]
    fn zero_ttl_disables_cache_and_keywords_override() {
        let s = Settings::from_cli(&parse(&[
            "--webhook-url",
            HOOK,
            "--cache-ttl-secs",
            "0",
            "--keywords",
            "AI早报, ,科技周报",
        ]))
        .unwrap();
        assert!(s.cache().is_none());
        assert_eq!(s.monitor.keywords, vec!["AI早报", "科技周报"]);
    }
}
