//! The poll-and-notify cycle, the daily push cycle, and the one-shot actions
//! behind the CLI modes.
//!
//! [`NewsMonitor`] owns a [`VideoSource`] and a [`Notifier`] and reloads the
//! ledger from disk at the start of every cycle. Per-item failures are logged
//! and skip only that item.

use crate::error::ProcessError;
use crate::freshness::{PushWindow, select_for_window, select_new};
use crate::models::Item;
use crate::notify::{self, NoticeKind, Notifier};
use crate::sources::{VideoSource, keyword_uploads};
use crate::store::{DailyMarker, Ledger, LedgerStats, export_ledger};
use crate::summarizer::build_summary;
use crate::utils::{ensure_writable_dir, truncate_for_log};
use chrono::{DateTime, FixedOffset, NaiveTime};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Runtime knobs the cycles need.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub keywords: Vec<String>,
    /// How the monitored creator is named in notices.
    pub creator_label: String,
    pub data_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub marker_path: PathBuf,
    pub check_interval_minutes: u64,
    pub daily_push_enabled: bool,
    pub push_time: NaiveTime,
    pub max_ledger_entries: usize,
    /// Write failed deliveries to the ledger too, so they are never retried.
    pub mark_failed_as_processed: bool,
    /// Pause between consecutive sends within one cycle.
    pub item_pause: Duration,
    /// How many recent matches the force mode re-sends.
    pub force_limit: usize,
}

/// What one poll cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub matched: usize,
    pub selected: usize,
    pub delivered: usize,
    pub marked: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The marker already covers today; nothing was fetched.
    AlreadyDone,
    Completed { in_window: usize, delivered: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub ledger: LedgerStats,
    pub data_dir: String,
    pub check_interval_minutes: u64,
    pub daily_push_enabled: bool,
    pub daily_push_time: String,
    pub daily_push_done_today: bool,
    pub checked_at: String,
    pub next_poll: Option<String>,
    pub next_daily_push: Option<String>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_none = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        writeln!(f, "total_processed: {}", self.ledger.total_processed)?;
        writeln!(f, "ledger_file: {}", self.ledger.path)?;
        writeln!(f, "ledger_last_modified: {}", or_none(&self.ledger.file_last_modified))?;
        writeln!(f, "data_dir: {}", self.data_dir)?;
        writeln!(f, "check_interval_minutes: {}", self.check_interval_minutes)?;
        writeln!(f, "daily_push_enabled: {}", self.daily_push_enabled)?;
        writeln!(f, "daily_push_time: {}", self.daily_push_time)?;
        writeln!(f, "daily_push_done_today: {}", self.daily_push_done_today)?;
        writeln!(f, "checked_at: {}", self.checked_at)?;
        writeln!(f, "next_poll: {}", or_none(&self.next_poll))?;
        write!(f, "next_daily_push: {}", or_none(&self.next_daily_push))
    }
}

pub struct NewsMonitor<S, N> {
    source: S,
    notifier: N,
    settings: MonitorSettings,
}

impl<S: VideoSource, N: Notifier> NewsMonitor<S, N> {
    pub fn new(source: S, notifier: N, settings: MonitorSettings) -> Self {
        Self {
            source,
            notifier,
            settings,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Fetch, keyword-filter, pick today's unseen uploads, notify each, then
    /// record them in the ledger.
    #[instrument(level = "info", skip(self, now), fields(now = %now))]
    pub async fn poll_cycle(&self, now: DateTime<FixedOffset>) -> CycleReport {
        let mut report = CycleReport::default();

        let items = keyword_uploads(&self.source, &self.settings.keywords).await;
        report.matched = items.len();
        if items.is_empty() {
            info!("No AI news uploads found");
            return report;
        }

        let mut ledger = Ledger::load(&self.settings.ledger_path).await;
        let fresh = select_new(&items, &ledger, &now);
        report.selected = fresh.len();
        if fresh.is_empty() {
            info!("No new uploads to process today");
            return report;
        }

        let outcomes = self.process_batch(&fresh, NoticeKind::New).await;
        report.delivered = outcomes.iter().filter(|(_, r)| r.is_ok()).count();

        let keep_failed = self.settings.mark_failed_as_processed;
        let to_mark = outcomes.iter().filter_map(|(id, result)| match result {
            Ok(()) => Some(id.as_str()),
            Err(e) if keep_failed => {
                warn!(error = %e, "Marking undelivered upload as processed");
                Some(id.as_str())
            }
            Err(e) => {
                warn!(error = %e, "Leaving undelivered upload for the next cycle");
                None
            }
        });
        report.marked = ledger.mark_all(to_mark).await;
        ledger.trim(self.settings.max_ledger_entries).await;

        info!(
            matched = report.matched,
            selected = report.selected,
            delivered = report.delivered,
            marked = report.marked,
            "Poll cycle complete"
        );
        report
    }

    /// Push uploads from the previous evening through this morning, at most
    /// once per calendar day in `now`'s offset.
    #[instrument(level = "info", skip(self, now), fields(now = %now))]
    pub async fn daily_push(&self, now: DateTime<FixedOffset>) -> PushOutcome {
        let marker = DailyMarker::new(&self.settings.marker_path);
        let today = now.date_naive();
        if marker.is_done_for(today).await {
            info!(%today, "Daily push already done today");
            return PushOutcome::AlreadyDone;
        }

        let items = keyword_uploads(&self.source, &self.settings.keywords).await;
        let window = PushWindow::ending_today(&now, self.settings.push_time);
        let in_window = select_for_window(&items, &window);
        info!(
            start = %window.start,
            end = %window.end,
            count = in_window.len(),
            "Uploads in push window"
        );
        if in_window.is_empty() {
            marker.mark_done(today).await;
            return PushOutcome::Completed {
                in_window: 0,
                delivered: 0,
            };
        }

        let mut ledger = Ledger::load(&self.settings.ledger_path).await;
        let pending: Vec<Item> = in_window
            .iter()
            .filter(|item| !ledger.contains(&item.id))
            .cloned()
            .collect();
        debug!(pending = pending.len(), "Unprocessed uploads in window");

        let outcomes = self.process_batch(&pending, NoticeKind::New).await;
        let delivered: Vec<&str> = outcomes
            .iter()
            .filter(|(_, r)| r.is_ok())
            .map(|(id, _)| id.as_str())
            .collect();
        ledger.mark_all(&delivered).await;
        marker.mark_done(today).await;

        if !delivered.is_empty() {
            self.notifier
                .send_plain(&notify::daily_push_notice(delivered.len(), &now))
                .await;
        }
        PushOutcome::Completed {
            in_window: in_window.len(),
            delivered: delivered.len(),
        }
    }

    /// Re-send the newest matching uploads regardless of the ledger, which is
    /// left untouched. Returns how many were delivered.
    #[instrument(level = "info", skip(self))]
    pub async fn force_reprocess(&self) -> usize {
        let items = keyword_uploads(&self.source, &self.settings.keywords).await;
        if items.is_empty() {
            info!("No AI news uploads found");
            return 0;
        }
        let newest: Vec<Item> = items.into_iter().take(self.settings.force_limit).collect();
        info!(count = newest.len(), "Force-processing newest uploads");
        self.process_batch(&newest, NoticeKind::New)
            .await
            .iter()
            .filter(|(_, r)| r.is_ok())
            .count()
    }

    /// Send the newest matching upload as a review notice, or the fixed
    /// "system OK" text when nothing matches.
    #[instrument(level = "info", skip(self))]
    pub async fn send_test_notification(&self) -> bool {
        let items = keyword_uploads(&self.source, &self.settings.keywords).await;
        let sent = match items.first() {
            Some(latest) => {
                let detail = self.source.upload_detail(&latest.id).await;
                let summary = build_summary(latest, detail.as_ref());
                self.notifier
                    .send_news(&notify::test_preview(&summary), NoticeKind::Review)
                    .await
            }
            None => self.notifier.send_plain(&notify::system_ok_notice()).await,
        };
        if sent {
            info!("Test notification sent");
        } else {
            error!("Failed to send test notification");
        }
        sent
    }

    /// Make sure the data directory works, log the ledger, then run one poll.
    pub async fn first_time_setup(
        &self,
        now: DateTime<FixedOffset>,
    ) -> Result<CycleReport, Box<dyn Error>> {
        ensure_writable_dir(&self.settings.data_dir).await?;
        let ledger = Ledger::load(&self.settings.ledger_path).await;
        if ledger.is_empty() {
            info!("No uploads recorded yet; this check may notify several");
        } else {
            let stats = ledger.stats().await;
            info!(
                total = stats.total_processed,
                path = %stats.path,
                "Ledger before initial check"
            );
        }
        Ok(self.poll_cycle(now).await)
    }

    pub async fn status(
        &self,
        now: DateTime<FixedOffset>,
        next_poll: Option<DateTime<FixedOffset>>,
        next_daily_push: Option<DateTime<FixedOffset>>,
    ) -> StatusReport {
        let ledger = Ledger::load(&self.settings.ledger_path).await;
        let marker = DailyMarker::new(&self.settings.marker_path);
        StatusReport {
            ledger: ledger.stats().await,
            data_dir: self.settings.data_dir.display().to_string(),
            check_interval_minutes: self.settings.check_interval_minutes,
            daily_push_enabled: self.settings.daily_push_enabled,
            daily_push_time: format!(
                "{} (UTC{})",
                self.settings.push_time.format("%H:%M"),
                now.offset()
            ),
            daily_push_done_today: marker.is_done_for(now.date_naive()).await,
            checked_at: now.to_rfc3339(),
            next_poll: next_poll.map(|t| t.to_rfc3339()),
            next_daily_push: next_daily_push.map(|t| t.to_rfc3339()),
        }
    }

    pub async fn export(&self, now: DateTime<FixedOffset>) -> Result<PathBuf, Box<dyn Error>> {
        let ledger = Ledger::load(&self.settings.ledger_path).await;
        export_ledger(&ledger, &self.settings.data_dir, now).await
    }

    /// Process `items` in order with a pause between consecutive sends.
    async fn process_batch(
        &self,
        items: &[Item],
        kind: NoticeKind,
    ) -> Vec<(String, Result<(), ProcessError>)> {
        let total = items.len();
        stream::iter(items.iter().enumerate())
            .then(|(i, item)| async move {
                if i > 0 && !self.settings.item_pause.is_zero() {
                    tokio::time::sleep(self.settings.item_pause).await;
                }
                info!(index = i + 1, total, id = %item.id, title = %item.title, "Processing upload");
                (item.id.clone(), self.process_item(item, kind).await)
            })
            .collect()
            .await
    }

    async fn process_item(&self, item: &Item, kind: NoticeKind) -> Result<(), ProcessError> {
        let detail = self.source.upload_detail(&item.id).await;
        match &detail {
            Some(d) => debug!(
                id = %item.id,
                title = %d.title,
                duration_secs = d.duration,
                views = d.view_count,
                pages = d.pages,
                multi_part = d.has_multiple_parts,
                "Using detail record"
            ),
            None => debug!(id = %item.id, "No detail record; summarizing from listing"),
        }
        let summary = build_summary(item, detail.as_ref());
        debug!(id = %item.id, summary = %truncate_for_log(&summary, 120), "Built summary");

        if self.notifier.send_news(&summary, kind).await {
            info!(id = %item.id, "Notification sent");
            Ok(())
        } else {
            warn!(id = %item.id, "Notification failed");
            Err(ProcessError::NotDelivered {
                id: item.id.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PublishTime, VideoDetail};
    use crate::notify::fake::RecordingNotifier;
    use crate::sources::DEFAULT_KEYWORDS;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeSource {
        items: Vec<Item>,
        details: HashMap<String, VideoDetail>,
        listing_calls: AtomicUsize,
    }

    impl VideoSource for FakeSource {
        async fn latest_uploads(&self, page_size: usize) -> Vec<Item> {
            self.listing_calls.fetch_add(1, Ordering::SeqCst);
            self.items.iter().take(page_size).cloned().collect()
        }

        async fn upload_detail(&self, id: &str) -> Option<VideoDetail> {
            self.details.get(id).cloned()
        }
    }

    fn cst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    fn upload(id: &str, title: &str, at: DateTime<FixedOffset>) -> Item {
        Item {
            id: id.into(),
            title: title.into(),
            description: "Google AI更新: 09:30\nGemini CLI 限额提升".into(),
            published: Some(PublishTime::Epoch(at.timestamp())),
            canonical_url: format!("https://www.bilibili.com/video/{id}"),
            tags: vec![],
        }
    }

    fn settings(dir: &Path) -> MonitorSettings {
        MonitorSettings {
            keywords: DEFAULT_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            creator_label: "285286947".into(),
            data_dir: dir.to_path_buf(),
            ledger_path: dir.join("processed_videos.txt"),
            marker_path: dir.join("daily_push_marker.txt"),
            check_interval_minutes: 360,
            daily_push_enabled: true,
            push_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            max_ledger_entries: 1000,
            mark_failed_as_processed: true,
            item_pause: Duration::ZERO,
            force_limit: 3,
        }
    }

    fn sample_source() -> FakeSource {
        FakeSource {
            items: vec![
                upload("BV1today0001", "【AI早报 2025-09-25】", cst(2025, 9, 25, 8, 0)),
                upload("BV1chat00001", "周末闲聊", cst(2025, 9, 25, 8, 30)),
                upload("BV1yest00001", "【AI早报 2025-09-24】", cst(2025, 9, 24, 19, 0)),
                upload("BV1old000001", "【AI早报 2025-09-23】", cst(2025, 9, 23, 8, 0)),
            ],
            ..Default::default()
        }
    }

    fn ledger_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn poll_notifies_todays_unseen_uploads_once() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let ledger_path = s.ledger_path.clone();
        let monitor = NewsMonitor::new(sample_source(), RecordingNotifier::default(), s);
        let now = cst(2025, 9, 25, 12, 0);

        let report = monitor.poll_cycle(now).await;
        assert_eq!(
            report,
            CycleReport {
                matched: 3,
                selected: 1,
                delivered: 1,
                marked: 1
            }
        );
        let sent = monitor.notifier().markdown();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("🤖 **AI早报更新提醒** 🤖"));
        assert!(sent[0].contains("📺 **【AI早报 2025-09-25】**"));
        assert_eq!(ledger_lines(&ledger_path), vec!["BV1today0001"]);

        let again = monitor.poll_cycle(now).await;
        assert_eq!(again.selected, 0);
        assert_eq!(monitor.notifier().markdown().len(), 1);
    }

    #[tokio::test]
    async fn failed_send_is_marked_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let ledger_path = s.ledger_path.clone();
        let notifier = RecordingNotifier {
            reject_all: true,
            ..Default::default()
        };
        let monitor = NewsMonitor::new(sample_source(), notifier, s);

        let report = monitor.poll_cycle(cst(2025, 9, 25, 12, 0)).await;
        assert_eq!(report.delivered, 0);
        assert_eq!(report.marked, 1);
        assert_eq!(ledger_lines(&ledger_path), vec!["BV1today0001"]);
    }

    #[tokio::test]
    async fn failed_send_is_retried_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.mark_failed_as_processed = false;
        let ledger_path = s.ledger_path.clone();
        let notifier = RecordingNotifier {
            reject_all: true,
            ..Default::default()
        };
        let monitor = NewsMonitor::new(sample_source(), notifier, s);

        let now = cst(2025, 9, 25, 12, 0);
        assert_eq!(monitor.poll_cycle(now).await.marked, 0);
        assert!(ledger_lines(&ledger_path).is_empty());
        assert_eq!(monitor.poll_cycle(now).await.selected, 1);
    }

    #[tokio::test]
    async fn poll_without_todays_uploads_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let ledger_path = s.ledger_path.clone();
        let monitor = NewsMonitor::new(sample_source(), RecordingNotifier::default(), s);

        let report = monitor.poll_cycle(cst(2025, 9, 27, 12, 0)).await;
        assert_eq!(report.selected, 0);
        assert!(monitor.notifier().markdown().is_empty());
        assert!(!ledger_path.exists());
    }

    #[tokio::test]
    async fn poll_prefers_detail_description() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = sample_source();
        source.details.insert(
            "BV1today0001".into(),
            VideoDetail {
                description: "OpenAI ChatGPT更新: 10:15\n新增语音对话功能".into(),
                tags: vec!["AI".into(), "科技资讯".into()],
                ..VideoDetail::default()
            },
        );
        let monitor = NewsMonitor::new(source, RecordingNotifier::default(), settings(dir.path()));

        monitor.poll_cycle(cst(2025, 9, 25, 12, 0)).await;
        let sent = monitor.notifier().markdown();
        assert!(sent[0].contains("OpenAI ChatGPT更新 (10:15)"));
        assert!(sent[0].contains("🏷️ **相关标签：** AI | 科技资讯"));
    }

    #[tokio::test]
    async fn daily_push_runs_once_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let monitor =
            NewsMonitor::new(sample_source(), RecordingNotifier::default(), settings(dir.path()));
        let now = cst(2025, 9, 25, 9, 30);

        let first = monitor.daily_push(now).await;
        assert_eq!(
            first,
            PushOutcome::Completed {
                in_window: 2,
                delivered: 2
            }
        );
        assert_eq!(monitor.source.listing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.notifier().markdown().len(), 2);
        let text = monitor.notifier().text();
        assert_eq!(text.len(), 1);
        assert!(text[0].contains("本次推送: 2条"));

        let second = monitor.daily_push(cst(2025, 9, 25, 9, 31)).await;
        assert_eq!(second, PushOutcome::AlreadyDone);
        assert_eq!(monitor.source.listing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.notifier().markdown().len(), 2);
    }

    #[tokio::test]
    async fn daily_push_with_empty_window_still_marks_the_day() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let marker = DailyMarker::new(&s.marker_path);
        let monitor = NewsMonitor::new(sample_source(), RecordingNotifier::default(), s);
        let now = cst(2025, 10, 1, 9, 30);

        assert_eq!(
            monitor.daily_push(now).await,
            PushOutcome::Completed {
                in_window: 0,
                delivered: 0
            }
        );
        assert!(marker.is_done_for(now.date_naive()).await);
        assert!(monitor.notifier().text().is_empty());
    }

    #[tokio::test]
    async fn daily_push_skips_ledger_entries_and_records_deliveries() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let ledger_path = s.ledger_path.clone();
        std::fs::write(&ledger_path, "BV1today0001\n").unwrap();
        let monitor = NewsMonitor::new(sample_source(), RecordingNotifier::default(), s);

        let outcome = monitor.daily_push(cst(2025, 9, 25, 9, 30)).await;
        assert_eq!(
            outcome,
            PushOutcome::Completed {
                in_window: 2,
                delivered: 1
            }
        );
        assert_eq!(
            ledger_lines(&ledger_path),
            vec!["BV1today0001", "BV1yest00001"]
        );
    }

    #[tokio::test]
    async fn force_reprocess_ignores_and_keeps_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        let ledger_path = s.ledger_path.clone();
        std::fs::write(&ledger_path, "BV1today0001\n").unwrap();
        let monitor = NewsMonitor::new(sample_source(), RecordingNotifier::default(), s);

        assert_eq!(monitor.force_reprocess().await, 3);
        assert_eq!(monitor.notifier().markdown().len(), 3);
        assert_eq!(ledger_lines(&ledger_path), vec!["BV1today0001"]);
    }

    #[tokio::test]
    async fn test_notification_uses_review_framing() {
        let dir = tempfile::tempdir().unwrap();
        let monitor =
            NewsMonitor::new(sample_source(), RecordingNotifier::default(), settings(dir.path()));

        assert!(monitor.send_test_notification().await);
        let sent = monitor.notifier().markdown();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("📋 **AI早报内容回顾** 📋"));
        assert!(sent[0].contains("以下是最新的AI早报内容预览"));
    }

    #[tokio::test]
    async fn test_notification_without_uploads_sends_system_ok() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = NewsMonitor::new(
            FakeSource::default(),
            RecordingNotifier::default(),
            settings(dir.path()),
        );

        assert!(monitor.send_test_notification().await);
        assert!(monitor.notifier().markdown().is_empty());
        assert_eq!(monitor.notifier().text(), vec![notify::system_ok_notice()]);
    }

    #[tokio::test]
    async fn first_time_setup_creates_data_dir_and_polls() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let monitor = NewsMonitor::new(sample_source(), RecordingNotifier::default(), settings(&data));

        let report = monitor.first_time_setup(cst(2025, 9, 25, 12, 0)).await.unwrap();
        assert!(data.is_dir());
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn status_and_export_reflect_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let s = settings(dir.path());
        std::fs::write(&s.ledger_path, "a\nb\n").unwrap();
        let monitor = NewsMonitor::new(FakeSource::default(), RecordingNotifier::default(), s);
        let now = cst(2025, 9, 25, 12, 0);

        let status = monitor.status(now, Some(cst(2025, 9, 25, 18, 0)), None).await;
        assert_eq!(status.ledger.total_processed, 2);
        assert_eq!(status.daily_push_time, "09:30 (UTC+08:00)");
        assert!(!status.daily_push_done_today);
        assert_eq!(status.next_poll.as_deref(), Some("2025-09-25T18:00:00+08:00"));
        assert!(status.to_string().contains("next_daily_push: -"));

        let path = monitor.export(now).await.unwrap();
        assert!(path.ends_with("export_20250925_120000.json"));
    }
}
