//! Data models for uploads, their detail records, and derived bullet entries.
//!
//! - [`Item`]: one upload as returned by a listing endpoint
//! - [`PublishTime`]: the publish timestamp, numeric or textual
//! - [`VideoDetail`]: the richer per-upload record used for summaries
//! - [`BulletEntry`]: one segmented line of a cleaned description

use serde::{Deserialize, Serialize};

/// Publish timestamp as the upstream returned it.
///
/// Listing endpoints send epoch seconds; cached or hand-fed records may carry
/// an ISO-8601 string instead.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PublishTime {
    /// Seconds since the Unix epoch.
    Epoch(i64),
    /// ISO-8601 text, possibly with a trailing `Z`, or epoch seconds as text.
    Text(String),
}

/// One upload from the monitored creator.
///
/// Immutable once fetched within a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Item {
    /// Stable upload id (`bvid`).
    pub id: String,
    pub title: String,
    /// Free text; may contain markup, links, and time labels.
    pub description: String,
    pub published: Option<PublishTime>,
    pub canonical_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Detail record for one upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct VideoDetail {
    pub title: String,
    pub description: String,
    /// Duration in seconds.
    pub duration: u64,
    pub view_count: u64,
    pub tags: Vec<String>,
    pub pages: usize,
    pub has_multiple_parts: bool,
}

/// A segmented piece of a description, before rendering.
///
/// Ordering follows the source text; duplicate bodies are legal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletEntry {
    pub label: Option<String>,
    pub time_marker: Option<String>,
    pub body: String,
}

impl BulletEntry {
    /// An entry with no label or time marker.
    pub fn plain(body: impl Into<String>) -> Self {
        Self {
            label: None,
            time_marker: None,
            body: body.into(),
        }
    }

    /// `label (time): body`, `label (time)` when the body is empty, or just the
    /// body for plain entries.
    pub fn display(&self) -> String {
        let head = match (&self.label, &self.time_marker) {
            (Some(label), Some(time)) => Some(format!("{label} ({time})")),
            (Some(label), None) => Some(label.clone()),
            (None, Some(time)) => Some(format!("({time})")),
            (None, None) => None,
        };
        match head {
            Some(head) if self.body.is_empty() => head,
            Some(head) => format!("{head}: {}", self.body),
            None => self.body.clone(),
        }
    }
}
