//! Decides which fetched uploads count as new.
//!
//! Two flavours exist. The poll cycle wants uploads published on the current
//! calendar day that the ledger has not seen. The daily push wants uploads
//! whose numeric timestamp lands in the evening-to-morning [`PushWindow`].

use crate::models::{Item, PublishTime};
use crate::store::Ledger;
use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use tracing::{debug, info, warn};

/// Hour of the previous day at which a push window opens.
const WINDOW_OPENS_HOUR: i64 = 18;

/// Resolve a publish timestamp to an instant in `tz`.
///
/// Accepts epoch seconds, RFC 3339 text (a trailing `Z` is read as
/// `+00:00`), offset-less `YYYY-MM-DDTHH:MM:SS` text taken as local to `tz`,
/// and epoch seconds written as text. Anything else is `None`.
pub fn publish_instant<Tz: TimeZone>(published: &PublishTime, tz: &Tz) -> Option<DateTime<Tz>> {
    match published {
        PublishTime::Epoch(secs) => {
            DateTime::from_timestamp(*secs, 0).map(|t| t.with_timezone(tz))
        }
        PublishTime::Text(raw) => {
            let raw = raw.trim();
            let normalized = match raw.strip_suffix('Z') {
                Some(head) => format!("{head}+00:00"),
                None => raw.to_string(),
            };
            if let Ok(t) = DateTime::parse_from_rfc3339(&normalized) {
                return Some(t.with_timezone(tz));
            }
            for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                    return tz.from_local_datetime(&naive).earliest();
                }
            }
            raw.parse::<f64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
                .map(|t| t.with_timezone(tz))
        }
    }
}

/// True when `item` was published on `now`'s calendar date, in `now`'s zone.
///
/// A missing or unparseable timestamp is `false`.
pub fn is_published_today<Tz: TimeZone>(item: &Item, now: &DateTime<Tz>) -> bool {
    let Some(published) = &item.published else {
        warn!(id = %item.id, "Upload missing publication date");
        return false;
    };
    match publish_instant(published, &now.timezone()) {
        Some(at) => {
            let today = now.date_naive();
            let day = at.date_naive();
            debug!(id = %item.id, %day, %today, "Compared publication date");
            day == today
        }
        None => {
            warn!(id = %item.id, ?published, "Unparseable publication date");
            false
        }
    }
}

/// Uploads published today that the ledger has not recorded, in input order.
///
/// When nothing was published today the ledger is not consulted.
pub fn select_new<Tz: TimeZone>(items: &[Item], ledger: &Ledger, now: &DateTime<Tz>) -> Vec<Item> {
    let today: Vec<&Item> = items
        .iter()
        .filter(|item| is_published_today(item, now))
        .collect();
    info!(count = today.len(), "Uploads published today");
    if today.is_empty() {
        return Vec::new();
    }

    let fresh: Vec<Item> = today
        .into_iter()
        .filter(|item| {
            let seen = ledger.contains(&item.id);
            if seen {
                debug!(id = %item.id, "Already processed");
            } else {
                info!(id = %item.id, title = %item.title, "New upload published today");
            }
            !seen
        })
        .cloned()
        .collect();
    info!(count = fresh.len(), "Uploads to process");
    fresh
}

/// Inclusive time span covered by one daily push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl PushWindow {
    /// From 18:00 on the day before `now` to `push_time` on `now`'s day, both
    /// read in `now`'s offset.
    pub fn ending_today(now: &DateTime<FixedOffset>, push_time: NaiveTime) -> Self {
        let tz = now.timezone();
        let today = now.date_naive();
        let midnight = today.and_time(NaiveTime::default());
        let start = midnight - TimeDelta::days(1) + TimeDelta::hours(WINDOW_OPENS_HOUR);
        let end = today.and_time(push_time);
        Self {
            start: at_offset(&tz, start),
            end: at_offset(&tz, end),
        }
    }

    pub fn contains(&self, at: &DateTime<FixedOffset>) -> bool {
        self.start <= *at && *at <= self.end
    }
}

fn at_offset(tz: &FixedOffset, local: NaiveDateTime) -> DateTime<FixedOffset> {
    let utc = local - TimeDelta::seconds(i64::from(tz.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, *tz)
}

/// Uploads whose numeric timestamp falls inside `window`, in input order.
///
/// Uploads without an epoch timestamp are left out.
pub fn select_for_window(items: &[Item], window: &PushWindow) -> Vec<Item> {
    let tz = window.start.timezone();
    items
        .iter()
        .filter(|item| match &item.published {
            Some(PublishTime::Epoch(secs)) => DateTime::from_timestamp(*secs, 0)
                .map(|t| t.with_timezone(&tz))
                .is_some_and(|at| window.contains(&at)),
            _ => {
                debug!(id = %item.id, "No numeric timestamp; excluded from push window");
                false
            }
        })
        .cloned()
        .collect()
}
