//! Once-per-day marker for the daily push.
//!
//! The file holds a single `YYYY-MM-DD`: the last calendar day, in the push
//! timezone, whose push window was processed.

use chrono::NaiveDate;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, error, instrument, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone)]
pub struct DailyMarker {
    path: PathBuf,
}

impl DailyMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The recorded day, if the file exists and parses.
    pub async fn last_completed(&self) -> Option<NaiveDate> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to read push marker");
                return None;
            }
        };
        match NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT) {
            Ok(day) => Some(day),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed push marker");
                None
            }
        }
    }

    pub async fn is_done_for(&self, day: NaiveDate) -> bool {
        self.last_completed().await == Some(day)
    }

    /// Record `day` as completed. Failures are logged only.
    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    pub async fn mark_done(&self, day: NaiveDate) {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(error = %e, "Failed to create marker directory");
                return;
            }
        }
        match fs::write(&self.path, day.format(DATE_FORMAT).to_string()).await {
            Ok(()) => debug!(%day, "Marked daily push done"),
            Err(e) => error!(%day, error = %e, "Failed to write push marker"),
        }
    }
}
