//! WeCom (enterprise WeChat) group robot webhook.

use crate::error::NotifyError;
use crate::notify::Notifier;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const PLACEHOLDER_KEY: &str = "YOUR_BOT_KEY";
const PROBE_TEXT: &str = "连接测试";

#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default = "unknown_errcode")]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

fn unknown_errcode() -> i64 {
    -1
}

/// Check that `webhook_url` is set, not the sample placeholder, and an
/// absolute http(s) URL.
pub fn validate_webhook_url(webhook_url: &str) -> Result<Url, NotifyError> {
    let trimmed = webhook_url.trim();
    if trimmed.is_empty() {
        return Err(NotifyError::InvalidWebhook("empty".into()));
    }
    if trimmed.contains(PLACEHOLDER_KEY) {
        return Err(NotifyError::InvalidWebhook(format!(
            "still contains {PLACEHOLDER_KEY}"
        )));
    }
    let url = Url::parse(trimmed).map_err(|e| NotifyError::InvalidWebhook(e.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        other => Err(NotifyError::InvalidWebhook(format!(
            "unsupported address scheme {other}"
        ))),
    }
}

pub struct WeComNotifier {
    client: Client,
    webhook_url: String,
}

impl WeComNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    /// Send the short connectivity message and report whether it landed.
    #[instrument(level = "info", skip(self))]
    pub async fn probe(&self) -> bool {
        match self.send_text(PROBE_TEXT).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Webhook probe failed");
                false
            }
        }
    }

    async fn post(&self, payload: serde_json::Value) -> Result<(), NotifyError> {
        let url = validate_webhook_url(&self.webhook_url)?;
        let reply: WebhookReply = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if reply.errcode != 0 {
            return Err(NotifyError::Rejected {
                code: reply.errcode,
                message: reply.errmsg,
            });
        }
        debug!("Webhook accepted message");
        Ok(())
    }
}

impl Notifier for WeComNotifier {
    #[instrument(level = "debug", skip_all)]
    async fn send_markdown(&self, content: &str) -> Result<(), NotifyError> {
        self.post(json!({ "msgtype": "markdown", "markdown": { "content": content } }))
            .await
    }

    #[instrument(level = "debug", skip_all)]
    async fn send_text(&self, content: &str) -> Result<(), NotifyError> {
        self.post(json!({ "msgtype": "text", "text": { "content": content } }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoticeKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> WeComNotifier {
        WeComNotifier::new(
            format!("{}/cgi-bin/webhook/send?key=abc", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "errcode": 0, "errmsg": "ok" }))
    }

    #[test]
    fn placeholder_and_malformed_urls_are_rejected() {
        assert!(validate_webhook_url("").is_err());
        assert!(
            validate_webhook_url("https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=YOUR_BOT_KEY")
                .is_err()
        );
        assert!(validate_webhook_url("not a url").is_err());
        assert!(validate_webhook_url("ftp://example.com/hook").is_err());
        assert!(
            validate_webhook_url("https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=abc").is_ok()
        );
    }

    #[tokio::test]
    async fn markdown_payload_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cgi-bin/webhook/send"))
            .and(body_partial_json(json!({
                "msgtype": "markdown",
                "markdown": { "content": "📺 **title**" }
            })))
            .respond_with(ok())
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server).send_markdown("📺 **title**").await.unwrap();
    }

    #[tokio::test]
    async fn nonzero_errcode_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "errcode": 93000, "errmsg": "invalid webhook url" })),
            )
            .mount(&server)
            .await;

        let err = notifier(&server).send_text("hi").await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { code: 93000, .. }));
    }

    #[tokio::test]
    async fn refused_markdown_is_resent_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "msgtype": "markdown" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "errcode": 40008, "errmsg": "invalid message type" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "msgtype": "text" })))
            .respond_with(ok())
            .expect(1)
            .mount(&server)
            .await;

        assert!(notifier(&server).send_news("📺 **t**", NoticeKind::New).await);
    }

    #[tokio::test]
    async fn placeholder_url_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok())
            .expect(0)
            .mount(&server)
            .await;

        let n = WeComNotifier::new(
            format!("{}/send?key=YOUR_BOT_KEY", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(!n.send_plain("x").await);
        assert!(!n.probe().await);
    }

    #[tokio::test]
    async fn probe_sends_connection_test_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "msgtype": "text", "text": { "content": "连接测试" } })))
            .respond_with(ok())
            .expect(1)
            .mount(&server)
            .await;

        assert!(notifier(&server).probe().await);
    }
}
