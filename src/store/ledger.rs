//! Append-only record of upload ids that have already been notified.
//!
//! The file holds one id per line in the order they were recorded. Reads that
//! fail are treated as an empty ledger and writes that fail are logged; the
//! in-memory view stays authoritative for the rest of the cycle either way.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument};

/// Default number of ids kept by [`Ledger::trim`].
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    ids: Vec<String>,
    seen: HashSet<String>,
}

/// Summary used by the status and export modes.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStats {
    pub total_processed: usize,
    pub path: String,
    pub file_last_modified: Option<String>,
}

impl Ledger {
    /// Read the ledger file at `path`. A missing or unreadable file gives an
    /// empty ledger.
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let ids = match fs::read_to_string(&path).await {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                error!(error = %e, "Failed to read ledger; treating as empty");
                Vec::new()
            }
        };
        let ledger = Self::from_ids(path, ids);
        debug!(count = ledger.len(), "Loaded ledger");
        ledger
    }

    /// Build a ledger from ids already in memory. Later duplicates are dropped.
    pub fn from_ids(path: PathBuf, ids: impl IntoIterator<Item = String>) -> Self {
        let mut ledger = Self {
            path,
            ids: Vec::new(),
            seen: HashSet::new(),
        };
        for id in ids {
            if ledger.seen.insert(id.clone()) {
                ledger.ids.push(id);
            }
        }
        ledger
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in recording order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Record `id` and append it to the file. Returns `false` when it was
    /// already present, in which case nothing is written.
    #[instrument(level = "debug", skip(self))]
    pub async fn mark_processed(&mut self, id: &str) -> bool {
        if id.is_empty() || !self.seen.insert(id.to_string()) {
            return false;
        }
        self.ids.push(id.to_string());

        if let Err(e) = self.append_line(id).await {
            error!(id, error = %e, "Failed to append to ledger file");
        } else {
            debug!(id, "Recorded processed upload");
        }
        true
    }

    /// [`mark_processed`](Self::mark_processed) for each id; returns how many
    /// were new.
    pub async fn mark_all<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for id in ids {
            if self.mark_processed(id.as_ref()).await {
                added += 1;
            }
        }
        added
    }

    /// Keep only the `keep_last` most recently recorded ids, rewriting the
    /// file. Returns the number of ids dropped.
    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    pub async fn trim(&mut self, keep_last: usize) -> usize {
        if self.ids.len() <= keep_last {
            debug!(total = self.ids.len(), "No trim needed");
            return 0;
        }
        let dropped = self.ids.len() - keep_last;
        let kept: Vec<String> = self.ids.split_off(dropped);
        for id in &self.ids {
            self.seen.remove(id);
        }
        self.ids = kept;

        let mut body = self.ids.join("\n");
        body.push('\n');
        match fs::write(&self.path, body).await {
            Ok(()) => info!(kept = self.ids.len(), dropped, "Trimmed ledger"),
            Err(e) => error!(error = %e, "Failed to rewrite trimmed ledger"),
        }
        dropped
    }

    pub async fn stats(&self) -> LedgerStats {
        let file_last_modified = match fs::metadata(&self.path).await {
            Ok(meta) => meta
                .modified()
                .ok()
                .map(|t| DateTime::<Local>::from(t).to_rfc3339()),
            Err(_) => None,
        };
        LedgerStats {
            total_processed: self.ids.len(),
            path: self.path.display().to_string(),
            file_last_modified,
        }
    }

    async fn append_line(&self, id: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{id}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("processed_videos.txt")).await;
        assert!(ledger.is_empty());
        assert!(!ledger.contains("BV1"));
    }

    #[tokio::test]
    async fn mark_appends_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("processed_videos.txt");

        let mut ledger = Ledger::load(&path).await;
        assert!(ledger.mark_processed("BV1aaaaaaaaa").await);
        assert!(ledger.mark_processed("BV1bbbbbbbbb").await);

        let reloaded = Ledger::load(&path).await;
        assert!(reloaded.contains("BV1aaaaaaaaa"));
        assert!(reloaded.contains("BV1bbbbbbbbb"));
        assert_eq!(reloaded.ids(), &["BV1aaaaaaaaa", "BV1bbbbbbbbb"]);
    }

    #[tokio::test]
    async fn marking_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_videos.txt");

        let mut ledger = Ledger::load(&path).await;
        assert!(ledger.mark_processed("BV1same").await);
        assert!(!ledger.mark_processed("BV1same").await);
        assert!(ledger.contains("BV1same"));
        assert_eq!(ledger.len(), 1);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "BV1same\n");
    }

    #[tokio::test]
    async fn mark_all_counts_new_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::load(dir.path().join("l.txt")).await;
        ledger.mark_processed("a").await;
        assert_eq!(ledger.mark_all(["a", "b", "c", "b"]).await, 2);
        assert_eq!(ledger.ids(), &["a", "b", "c"]);
    }

    #[tokio::test]
    async fn trim_keeps_most_recent_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l.txt");
        let mut ledger = Ledger::load(&path).await;
        ledger.mark_all(["1", "2", "3", "4", "5"]).await;

        assert_eq!(ledger.trim(3).await, 2);
        assert_eq!(ledger.ids(), &["3", "4", "5"]);
        assert!(!ledger.contains("1"));

        let reloaded = Ledger::load(&path).await;
        assert_eq!(reloaded.ids(), &["3", "4", "5"]);
        assert_eq!(ledger.trim(3).await, 0);
    }

    #[tokio::test]
    async fn stats_report_count_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::load(dir.path().join("l.txt")).await;
        assert!(ledger.stats().await.file_last_modified.is_none());
        ledger.mark_processed("x").await;
        let stats = ledger.stats().await;
        assert_eq!(stats.total_processed, 1);
        assert!(stats.file_last_modified.is_some());
    }
}
