//! Upstream video sources.
//!
//! A [`VideoSource`] exposes the two operations the cycles need: list the
//! creator's latest uploads and fetch the detail record for one upload. Both
//! swallow their own failures: a listing that cannot be fetched is empty and a
//! detail that cannot be fetched is `None`.
//!
//! | Source | Module | Endpoints |
//! |--------|--------|-----------|
//! | Bilibili | [`bilibili`] | `wbi/arc/search`, `arc/search`, `web-interface/view` |

pub mod bilibili;

use crate::models::{Item, VideoDetail};
use tracing::{debug, info, instrument};

pub use bilibili::BilibiliClient;

/// Title substrings that mark an "AI news" episode, compared lowercased.
pub const DEFAULT_KEYWORDS: &[&str] = &["ai早报", "ai 早报", "ai日报", "ai简报", "ai资讯"];

/// How many recent uploads are scanned for keyword matches.
pub const KEYWORD_PAGE_SIZE: usize = 20;

/// Listing and detail access for one creator.
pub trait VideoSource {
    /// Most recent uploads, newest first. Empty when every endpoint fails.
    async fn latest_uploads(&self, page_size: usize) -> Vec<Item>;

    /// Detail record for `id`, or `None` when unavailable.
    async fn upload_detail(&self, id: &str) -> Option<VideoDetail>;
}

/// Keep items whose lowercased title contains any lowercased keyword.
pub fn filter_by_keywords(items: Vec<Item>, keywords: &[String]) -> Vec<Item> {
    let needles: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    items
        .into_iter()
        .filter(|item| {
            let title = item.title.to_lowercase();
            let hit = needles.iter().any(|k| title.contains(k.as_str()));
            if !hit {
                debug!(id = %item.id, title = %item.title, "Title does not match keywords");
            }
            hit
        })
        .collect()
}

/// Fetch a page of recent uploads and keep the keyword matches.
#[instrument(level = "info", skip_all)]
pub async fn keyword_uploads<S: VideoSource>(source: &S, keywords: &[String]) -> Vec<Item> {
    let uploads = source.latest_uploads(KEYWORD_PAGE_SIZE).await;
    let total = uploads.len();
    let matched = filter_by_keywords(uploads, keywords);
    info!(total, matched = matched.len(), "Filtered uploads by keyword");
    matched
}
