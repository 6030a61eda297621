//! HTTP client for the Bilibili public web API.
//!
//! Listing tries an ordered list of [`ListingEndpoint`] strategies and takes
//! the first that yields a result. [`BilibiliClient::with_base_url`] takes
//! [`DEFAULT_BASE_URL`] in production and a mock server in tests.

use crate::error::FetchError;
use crate::models::{Item, PublishTime, VideoDetail};
use crate::sources::VideoSource;
use crate::store::ResponseCache;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, ORIGIN, REFERER};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.bilibili.com";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const ACCEPT_LANGUAGE_VALUE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Canonical watch page for an upload.
pub fn video_url(bvid: &str) -> String {
    format!("https://www.bilibili.com/video/{bvid}")
}

/// One way of listing a creator's uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingEndpoint {
    /// `x/space/wbi/arc/search`; needs `data.list.vlist`.
    WbiSearch,
    /// `x/space/arc/search` with browser-like headers; tolerates either shape.
    ArcSearch,
}

impl ListingEndpoint {
    /// Strategies in the order they are tried.
    pub const ORDER: [ListingEndpoint; 2] = [ListingEndpoint::WbiSearch, ListingEndpoint::ArcSearch];

    fn path(self) -> &'static str {
        match self {
            ListingEndpoint::WbiSearch => "x/space/wbi/arc/search",
            ListingEndpoint::ArcSearch => "x/space/arc/search",
        }
    }

    fn max_page_size(self) -> usize {
        match self {
            ListingEndpoint::WbiSearch => 30,
            ListingEndpoint::ArcSearch => 20,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct ListingData {
    list: Option<VideoList>,
    vlist: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoList {
    vlist: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RawUpload {
    bvid: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    created: Option<PublishTime>,
}

#[derive(Debug, Deserialize)]
struct RawDetail {
    #[serde(default)]
    title: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    stat: RawStat,
    #[serde(default)]
    tag: Vec<RawTag>,
    #[serde(default)]
    pages: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStat {
    #[serde(default)]
    view: u64,
}

#[derive(Debug, Deserialize)]
struct RawTag {
    #[serde(default)]
    tag_name: String,
}

impl From<RawDetail> for VideoDetail {
    fn from(raw: RawDetail) -> Self {
        let pages = raw.pages.len();
        VideoDetail {
            title: raw.title,
            description: raw.desc,
            duration: raw.duration,
            view_count: raw.stat.view,
            tags: raw.tag.into_iter().map(|t| t.tag_name).collect(),
            pages,
            has_multiple_parts: pages > 1,
        }
    }
}

/// Client for one creator's uploads.
pub struct BilibiliClient {
    client: Client,
    base_url: Url,
    uid: String,
    cache: Option<ResponseCache>,
}

impl BilibiliClient {
    /// Client against `base_url`, normally [`DEFAULT_BASE_URL`].
    pub fn with_base_url(
        base_url: &str,
        uid: &str,
        timeout: Duration,
        cache: Option<ResponseCache>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        // A trailing slash keeps `join` from replacing the last path segment.
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        Ok(Self {
            client,
            base_url,
            uid: uid.to_string(),
            cache,
        })
    }

    /// Run one listing strategy.
    #[instrument(level = "debug", skip(self), fields(uid = %self.uid))]
    pub async fn fetch_listing(
        &self,
        endpoint: ListingEndpoint,
        page_size: usize,
    ) -> Result<Vec<Item>, FetchError> {
        let ps = page_size.min(endpoint.max_page_size()).to_string();
        let mut url = self.base_url.join(endpoint.path())?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("mid", &self.uid);
            pairs.append_pair("ps", &ps);
            if endpoint == ListingEndpoint::WbiSearch {
                pairs.append_pair("tid", "0");
            }
            pairs.append_pair("pn", "1");
            if endpoint == ListingEndpoint::WbiSearch {
                pairs.append_pair("keyword", "");
            }
            pairs.append_pair("order", "pubdate");
        }

        let request = self
            .client
            .get(url)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE);
        let request = match endpoint {
            ListingEndpoint::WbiSearch => request
                .header(ACCEPT, "application/json")
                .header(CACHE_CONTROL, "no-cache"),
            ListingEndpoint::ArcSearch => request
                .header(ACCEPT, "application/json, text/plain, */*")
                .header(REFERER, format!("https://space.bilibili.com/{}", self.uid))
                .header(ORIGIN, "https://space.bilibili.com"),
        };

        let data: Option<ListingData> = send_envelope(request, endpoint.path()).await?;
        let data = data.unwrap_or_default();
        let records = match endpoint {
            ListingEndpoint::WbiSearch => data.list.and_then(|l| l.vlist).ok_or(
                FetchError::MissingField {
                    endpoint: "wbi/arc/search",
                    field: "data.list.vlist",
                },
            )?,
            ListingEndpoint::ArcSearch => data
                .list
                .and_then(|l| l.vlist)
                .or(data.vlist)
                .unwrap_or_default(),
        };
        Ok(into_items(records))
    }

    /// Fetch the detail record for `bvid`.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_detail(&self, bvid: &str) -> Result<VideoDetail, FetchError> {
        let mut url = self.base_url.join("x/web-interface/view")?;
        url.query_pairs_mut().append_pair("bvid", bvid);
        let request = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .header(CACHE_CONTROL, "no-cache")
            .header(REFERER, video_url(bvid))
            .header(ORIGIN, "https://www.bilibili.com");
        let data: Option<RawDetail> = send_envelope(request, "web-interface/view").await?;
        data.map(VideoDetail::from).ok_or(FetchError::MissingField {
            endpoint: "web-interface/view",
            field: "data",
        })
    }
}

/// Send, require 2xx, decode the envelope, and require `code == 0`.
async fn send_envelope<T: DeserializeOwned>(
    request: RequestBuilder,
    context: &str,
) -> Result<Option<T>, FetchError> {
    let response = request.send().await?.error_for_status()?;
    let body = response.text().await?;
    let envelope: Envelope<T> =
        serde_json::from_str(&body).map_err(|e| FetchError::Deserialize {
            context: context.to_string(),
            source: e,
        })?;
    if envelope.code != 0 {
        return Err(FetchError::Api {
            code: envelope.code,
            message: envelope.message,
        });
    }
    Ok(envelope.data)
}

fn into_items(records: Vec<serde_json::Value>) -> Vec<Item> {
    records
        .into_iter()
        .filter_map(|record| {
            let raw: RawUpload = match serde_json::from_value(record) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable upload record");
                    return None;
                }
            };
            let Some(bvid) = raw.bvid.filter(|b| !b.is_empty()) else {
                warn!(title = %raw.title, "Upload record missing bvid; skipping");
                return None;
            };
            Some(Item {
                canonical_url: video_url(&bvid),
                id: bvid,
                title: raw.title,
                description: raw.description,
                published: raw.created,
                tags: Vec::new(),
            })
        })
        .collect()
}

impl VideoSource for BilibiliClient {
    #[instrument(level = "info", skip(self), fields(uid = %self.uid))]
    async fn latest_uploads(&self, page_size: usize) -> Vec<Item> {
        let key = format!("uploads_{}_{}", self.uid, page_size);
        if let Some(cache) = &self.cache {
            if let Some(items) = cache.get::<Vec<Item>>(&key).await {
                debug!(count = items.len(), "Serving uploads from cache");
                return items;
            }
        }

        for endpoint in ListingEndpoint::ORDER {
            match self.fetch_listing(endpoint, page_size).await {
                Ok(items) => {
                    info!(?endpoint, count = items.len(), "Fetched uploads");
                    if let Some(cache) = &self.cache {
                        if !items.is_empty() {
                            cache.put(&key, &items).await;
                        }
                    }
                    return items;
                }
                Err(e) => warn!(?endpoint, error = %e, "Listing endpoint failed"),
            }
        }
        error!("All listing endpoints failed; returning no uploads");
        Vec::new()
    }

    #[instrument(level = "info", skip(self))]
    async fn upload_detail(&self, id: &str) -> Option<VideoDetail> {
        let key = format!("detail_{id}");
        if let Some(cache) = &self.cache {
            if let Some(detail) = cache.get::<VideoDetail>(&key).await {
                return Some(detail);
            }
        }
        match self.fetch_detail(id).await {
            Ok(detail) => {
                debug!(tags = detail.tags.len(), pages = detail.pages, "Fetched upload detail");
                if let Some(cache) = &self.cache {
                    cache.put(&key, &detail).await;
                }
                Some(detail)
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch upload detail");
                None
            }
        }
    }
}
