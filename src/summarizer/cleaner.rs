//! Description cleaning and bullet segmentation.
//!
//! A raw description goes through a fixed sequence of whole-text passes
//! (markup, separators, pictographs, links and ids, whitespace, boilerplate)
//! and is then segmented by the first strategy in [`SEGMENTERS`] that yields
//! anything:
//!
//! 1. time labels such as `Google AI更新: 09:30` or `Meta AI发布: 9月23日`
//! 2. blank-line separated paragraphs
//! 3. single lines
//!
//! When all three come back empty the cleaned text itself is returned, not
//! bulleted.

use crate::models::BulletEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, instrument};

/// Prefix of every rendered entry.
pub const BULLET: &str = "• ";
/// Most entries kept per description.
pub const MAX_ENTRIES: usize = 8;
/// Longest body rendered untruncated, in characters.
pub const MAX_BODY_CHARS: usize = 200;
const TRUNCATED_BODY_CHARS: usize = 197;
const ELLIPSIS: &str = "...";

/// Entries from the time-label and paragraph tiers must be longer than this.
const MIN_ENTRY_CHARS: usize = 10;
/// Entries from the line tier must be longer than this.
const MIN_LINE_CHARS: usize = 3;

const PARAGRAPH_GLYPHS: [char; 2] = ['\u{2029}', '◆'];

const SENTENCE_ENDS: &str = "。！？；!?;";

const BOILERPLATE: &[&str] = &[
    "点击展开",
    "展开全部",
    "收起",
    "更多精彩内容",
    "关注我们",
    "订阅频道",
    "链接：",
    "网址：",
    "地址：",
    "官网：",
    "详情：",
    "查看更多",
    "点击查看",
    "复制链接",
    "分享链接",
    "click to expand",
    "subscribe",
    "link:",
    "see more",
];

static BREAK_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>").unwrap());

// Pictographs, dingbats, symbols and joiners. CJK blocks are not touched.
static PICTOGRAPHS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}\x{2B00}-\x{2BFF}\x{FE00}-\x{FE0F}\x{200D}\x{20E3}]",
    )
    .unwrap()
});

// Link bodies stop at whitespace and at CJK text or punctuation, which
// descriptions often glue directly onto a URL.
static LINKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[A-Za-z][A-Za-z0-9+.\-]*://[^\s\p{Han}\x{3000}-\x{303F}\x{FF00}-\x{FFEF}]+",
        r"(?i)www\.[^\s\p{Han}\x{3000}-\x{303F}\x{FF00}-\x{FFEF}]+",
        r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}",
        r"BV[0-9A-Za-z]{10}",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

// `av` codes only when not glued to a preceding ASCII word ("Nav2").
static AV_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<pre>^|[^A-Za-z0-9])av\d+").unwrap());

static HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());
static SPACED_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r" *\n *").unwrap());
static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static EXCESS_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static INNER_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\n\s*").unwrap());

static TIME_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?P<label>[^\n:：]{1,40}?) ?[:：] ?",
        r"(?P<time>\d{4}-\d{1,2}-\d{1,2}",
        r"|\d{1,2}:\d{2}",
        r"|\d{1,2}月\d{1,2}日",
        r"|\d{1,2}/\d{1,2}",
        r"|\d{1,2}-\d{1,2}",
        r"|今天|昨天|明天|本周|上周|下周",
        r"|(?i:today|yesterday|tomorrow|this week|last week|next week))",
        r"(?:\D|$)",
    ))
    .unwrap()
});

type Segmenter = fn(&str) -> Vec<BulletEntry>;

/// Segmentation tiers, most specific first.
const SEGMENTERS: [(&str, Segmenter); 3] = [
    ("time_labels", segment_by_time_labels),
    ("paragraphs", segment_by_paragraphs),
    ("lines", segment_by_lines),
];

/// Clean a raw description into display-ready lines.
///
/// Each line is a bulleted entry capped at [`MAX_BODY_CHARS`] of body, at most
/// [`MAX_ENTRIES`] of them. If no tier produces an entry, the single element is
/// the cleaned text with its paragraph breaks kept. Empty input yields an
/// empty vector.
#[instrument(level = "debug", skip_all, fields(raw_len = raw.len()))]
pub fn clean(raw: &str) -> Vec<String> {
    let text = normalize(raw);

    for (tier, segment) in SEGMENTERS {
        let entries = segment(&text);
        if !entries.is_empty() {
            debug!(tier, count = entries.len(), "Segmented description");
            return entries
                .iter()
                .take(MAX_ENTRIES)
                .map(render_entry)
                .collect();
        }
    }

    let fallback = EXCESS_BREAKS.replace_all(&text, "\n\n");
    let fallback = fallback.trim();
    if fallback.is_empty() {
        Vec::new()
    } else {
        debug!("No segmentation tier matched; returning cleaned text");
        vec![fallback.to_string()]
    }
}

/// [`clean`] joined with newlines.
pub fn clean_text(raw: &str) -> String {
    clean(raw).join("\n")
}

/// Steps 1–6: everything that runs on the whole accumulator before
/// segmentation.
fn normalize(raw: &str) -> String {
    let mut text = if raw.contains('<') && raw.contains('>') {
        strip_markup(raw)
    } else {
        raw.to_string()
    };

    text = text.replace(PARAGRAPH_GLYPHS, "\n\n");
    text = PICTOGRAPHS.replace_all(&text, "").into_owned();
    for link in LINKS.iter() {
        text = link.replace_all(&text, " ").into_owned();
    }
    text = AV_CODE.replace_all(&text, "${pre} ").into_owned();
    text = collapse_whitespace(&text);
    for phrase in BOILERPLATE {
        text = text.replace(phrase, "");
    }
    text
}

fn strip_markup(raw: &str) -> String {
    let with_breaks = BREAK_TAGS.replace_all(raw, "\n");
    let fragment = Html::parse_fragment(&with_breaks);
    fragment.root_element().text().collect::<String>()
}

/// Collapse horizontal whitespace to one space and drop spaces hugging line
/// breaks. Line breaks themselves survive.
fn collapse_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    SPACED_NEWLINE.replace_all(&text, "\n").into_owned()
}

fn fold_breaks(text: &str) -> String {
    INNER_BREAKS.replace_all(text.trim(), " ").into_owned()
}

fn has_word_char(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

fn clean_label(label: &str) -> Option<String> {
    let label = label.trim_matches(|c: char| c.is_whitespace() || "-*•·|".contains(c));
    (!label.is_empty()).then(|| label.to_string())
}

fn segment_by_time_labels(text: &str) -> Vec<BulletEntry> {
    let matches: Vec<_> = TIME_LABEL.captures_iter(text).collect();
    // Where each entry really begins once a leading sentence is handed back
    // to the previous body.
    let starts: Vec<usize> = matches
        .iter()
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(caps.name("label").map_or(whole.start(), |label| {
                label.start() + sentence_tail_start(label.as_str())
            }))
        })
        .collect();
    let mut entries = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let (Some(whole), Some(&start)) = (caps.get(0), starts.get(i)) else {
            continue;
        };
        let body_start = caps.name("time").map_or(whole.end(), |m| m.end());
        let body_end = starts.get(i + 1).copied().unwrap_or(text.len());

        let entry = BulletEntry {
            label: caps
                .name("label")
                .and_then(|m| clean_label(&text[start..m.end()])),
            time_marker: caps.name("time").map(|m| m.as_str().to_string()),
            body: fold_breaks(&text[body_start..body_end.max(body_start)]),
        };
        if entry.display().trim().chars().count() > MIN_ENTRY_CHARS {
            entries.push(entry);
        }
    }
    entries
}

/// Byte offset just past the last sentence terminator in `label`, or 0.
///
/// A `.` only ends a sentence when whitespace follows, so "GPT-4.5" stays
/// whole.
fn sentence_tail_start(label: &str) -> usize {
    let mut start = 0;
    let mut chars = label.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let ends_sentence = SENTENCE_ENDS.contains(c)
            || (c == '.' && chars.peek().is_some_and(|&(_, next)| next.is_whitespace()));
        if ends_sentence {
            start = i + c.len_utf8();
        }
    }
    start
}

fn segment_by_paragraphs(text: &str) -> Vec<BulletEntry> {
    PARAGRAPH_BREAK
        .split(text)
        .map(fold_breaks)
        .filter(|p| p.chars().count() > MIN_ENTRY_CHARS && has_word_char(p))
        .map(BulletEntry::plain)
        .collect()
}

fn segment_by_lines(text: &str) -> Vec<BulletEntry> {
    text.lines()
        .map(str::trim)
        .filter(|l| l.chars().count() > MIN_LINE_CHARS && has_word_char(l))
        .map(BulletEntry::plain)
        .collect()
}

fn render_entry(entry: &BulletEntry) -> String {
    let body = if entry.body.chars().count() > MAX_BODY_CHARS {
        let mut cut: String = entry.body.chars().take(TRUNCATED_BODY_CHARS).collect();
        cut.push_str(ELLIPSIS);
        cut
    } else {
        entry.body.clone()
    };
    let capped = BulletEntry {
        body,
        ..entry.clone()
    };
    format!("{BULLET}{}", capped.display())
}
