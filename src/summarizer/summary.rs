//! Composes one notice body from an upload and its optional detail record.
//!
//! The layout is a title line, an optional bulleted description section, an
//! optional tag line (detail only), and exactly one link line. The link line
//! carries the only URL in the output; [`clean_text`] has already removed any
//! others from the description.

use crate::models::{Item, VideoDetail};
use crate::summarizer::cleaner::clean_text;
use itertools::Itertools;
use std::fmt::{self, Write};
use thiserror::Error;
use tracing::{instrument, warn};

/// Most tags listed on the tag line.
pub const MAX_TAGS: usize = 5;
const UNKNOWN_TITLE: &str = "未知标题";

#[derive(Debug, Error)]
enum SummaryError {
    #[error("item {0} has no title")]
    MissingTitle(String),
    #[error("formatting failed: {0}")]
    Format(#[from] fmt::Error),
}

/// Build the notice body for `item`.
///
/// With a `detail`, its description wins when non-blank and up to
/// [`MAX_TAGS`] non-empty tags are attached. Never fails: any problem
/// degrades to a title line plus a link line.
#[instrument(level = "debug", skip_all, fields(id = %item.id))]
pub fn build_summary(item: &Item, detail: Option<&VideoDetail>) -> String {
    match try_build(item, detail) {
        Ok(body) => body,
        Err(e) => {
            warn!(id = %item.id, error = %e, "Falling back to minimal summary");
            minimal_summary(item)
        }
    }
}

fn try_build(item: &Item, detail: Option<&VideoDetail>) -> Result<String, SummaryError> {
    let title = single_line(&item.title);
    if title.is_empty() {
        return Err(SummaryError::MissingTitle(item.id.clone()));
    }

    let mut out = String::new();
    write!(out, "📺 **{title}**")?;

    let description = detail
        .map(|d| d.description.as_str())
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(&item.description);
    let cleaned = clean_text(description);
    let cleaned = cleaned.trim();
    if !cleaned.is_empty() {
        write!(out, "\n📋 **内容概要：**\n{cleaned}")?;
    }

    if let Some(detail) = detail {
        let tags = detail
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .take(MAX_TAGS)
            .join(" | ");
        if !tags.is_empty() {
            write!(out, "\n🏷️ **相关标签：** {tags}")?;
        }
    }

    write!(out, "\n🔗 **观看链接：** {}", item.canonical_url)?;
    Ok(out)
}

fn minimal_summary(item: &Item) -> String {
    let title = single_line(&item.title);
    let title = if title.is_empty() { UNKNOWN_TITLE } else { title.as_str() };
    format!("📺 {title}\n🔗 {}", item.canonical_url)
}

fn single_line(s: &str) -> String {
    s.split_whitespace().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PublishTime;

    fn item(title: &str, description: &str) -> Item {
        Item {
            id: "BV1N3n4zpEk2".into(),
            title: title.into(),
            description: description.into(),
            published: Some(PublishTime::Epoch(1_758_758_400)),
            canonical_url: "https://www.bilibili.com/video/BV1N3n4zpEk2".into(),
            tags: vec![],
        }
    }

    #[test]
    fn empty_description_gives_title_and_link_only() {
        let out = build_summary(&item("【AI 早报 2025-09-25】", ""), None);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "📺 **【AI 早报 2025-09-25】**",
                "🔗 **观看链接：** https://www.bilibili.com/video/BV1N3n4zpEk2",
            ]
        );
    }

    #[test]
    fn description_is_bulleted_and_link_is_the_only_url() {
        let it = item(
            "【AI 早报】",
            "Google AI更新: 09:30\nGemini CLI 限额提升，详见 https://blog.google/x",
        );
        let out = build_summary(&it, None);
        assert!(out.contains("📋 **内容概要：**\n• Google AI更新 (09:30): Gemini CLI 限额提升，详见"));
        assert_eq!(out.matches("https://").count(), 1);
        assert!(out.ends_with("🔗 **观看链接：** https://www.bilibili.com/video/BV1N3n4zpEk2"));
        assert!(!out.contains("🏷️"));
    }

    #[test]
    fn detail_description_and_tags_are_preferred() {
        let it = item("【AI 早报】", "listing text that should lose");
        let detail = VideoDetail {
            description: "OpenAI ChatGPT更新: 10:15\n新增语音对话功能，支持实时语音交互。".into(),
            tags: vec![
                "AI".into(),
                "".into(),
                "人工智能".into(),
                "科技资讯".into(),
                "Google".into(),
                "OpenAI".into(),
                "Meta".into(),
            ],
            ..VideoDetail::default()
        };
        let out = build_summary(&it, Some(&detail));
        assert!(!out.contains("listing text"));
        assert!(out.contains("OpenAI ChatGPT更新 (10:15)"));
        assert!(out.contains("🏷️ **相关标签：** AI | 人工智能 | 科技资讯 | Google | OpenAI\n"));
        assert!(!out.contains("Meta"));
    }

    #[test]
    fn blank_detail_description_falls_back_to_item() {
        let it = item("【AI 早报】", "第一段内容讲的是人工智能技术的最新发展");
        let detail = VideoDetail::default();
        let out = build_summary(&it, Some(&detail));
        assert!(out.contains("• 第一段内容讲的是人工智能技术的最新发展"));
    }

    #[test]
    fn missing_title_degrades_to_two_lines() {
        let out = build_summary(&item("  ", "whatever body text here"), None);
        assert_eq!(
            out,
            "📺 未知标题\n🔗 https://www.bilibili.com/video/BV1N3n4zpEk2"
        );
    }
}
