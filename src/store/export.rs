//! JSON snapshot of the ledger for the `export` mode.
//!
//! Files land in the data directory as `export_YYYYMMDD_HHMMSS.json`.

use crate::store::{Ledger, LedgerStats};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Serialize)]
pub struct LedgerExport<'a> {
    pub export_time: String,
    pub stats: LedgerStats,
    pub processed_videos: &'a [String],
}

/// Write the ledger snapshot under `dir` and return the file path.
#[instrument(level = "info", skip_all, fields(dir = %dir.as_ref().display()))]
pub async fn export_ledger(
    ledger: &Ledger,
    dir: impl AsRef<Path>,
    now: DateTime<FixedOffset>,
) -> Result<PathBuf, Box<dyn Error>> {
    let dir = dir.as_ref();
    let export = LedgerExport {
        export_time: now.to_rfc3339(),
        stats: ledger.stats().await,
        processed_videos: ledger.ids(),
    };
    let json = serde_json::to_string_pretty(&export)?;

    if let Err(e) = fs::create_dir_all(dir).await {
        error!(error = %e, "Failed to create export dir");
        return Err(e.into());
    }

    let path = dir.join(format!("export_{}.json", now.format("%Y%m%d_%H%M%S")));
    fs::write(&path, json).await?;
    info!(path = %path.display(), count = ledger.len(), "Wrote ledger export");
    Ok(path)
}
