//! Outbound notifications.
//!
//! A [`Notifier`] delivers markdown or plain-text bodies and reports failures
//! as [`NotifyError`]. The provided methods turn those into the boolean
//! results the cycles consume, falling back from markdown to plain text when
//! the remote side refuses the rich form.

pub mod wecom;

use crate::error::NotifyError;
use chrono::{DateTime, FixedOffset};
use tracing::{error, info, warn};

pub use wecom::WeComNotifier;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Framing applied around a summary before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// A freshly published episode.
    New,
    /// A replay of an older episode, used by the test mode.
    Review,
}

impl NoticeKind {
    fn header(self) -> &'static str {
        match self {
            NoticeKind::New => "🤖 **AI早报更新提醒** 🤖\n\n",
            NoticeKind::Review => "📋 **AI早报内容回顾** 📋\n\n",
        }
    }

    fn footer(self) -> &'static str {
        match self {
            NoticeKind::New => "\n\n---\n💡 *及时了解AI前沿动态，把握技术发展趋势*",
            NoticeKind::Review => "\n\n---\n💡 *定期回顾AI资讯，保持技术敏感度*",
        }
    }

    pub fn frame(self, summary: &str) -> String {
        format!("{}{}{}", self.header(), summary, self.footer())
    }
}

pub trait Notifier {
    async fn send_markdown(&self, content: &str) -> Result<(), NotifyError>;

    async fn send_text(&self, content: &str) -> Result<(), NotifyError>;

    /// Frame `summary` and deliver it, retrying as plain text if the markdown
    /// form is refused. A bad local webhook address is not retried.
    async fn send_news(&self, summary: &str, kind: NoticeKind) -> bool {
        let content = kind.frame(summary);
        match self.send_markdown(&content).await {
            Ok(()) => {
                info!(?kind, "Markdown notice delivered");
                true
            }
            Err(e) if e.is_local() => {
                warn!(error = %e, "Notice not sent");
                false
            }
            Err(e) => {
                warn!(error = %e, "Markdown notice failed; retrying as plain text");
                self.send_plain(&markdown_to_text(&content)).await
            }
        }
    }

    /// Deliver a plain-text body, reporting only success or failure.
    async fn send_plain(&self, content: &str) -> bool {
        match self.send_text(content).await {
            Ok(()) => {
                info!("Text notice delivered");
                true
            }
            Err(e) if e.is_local() => {
                warn!(error = %e, "Text notice not sent");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to send text notice");
                false
            }
        }
    }
}

/// Strip the markdown markers the webhook would otherwise show literally.
pub fn markdown_to_text(markdown: &str) -> String {
    markdown
        .replace("**", "")
        .replace('*', "")
        .replace('#', "")
        .replace('`', "")
        .replace("---", "————————————")
}

pub fn error_notice(message: &str) -> String {
    format!("⚠️ **AI早报监控系统错误**\n\n错误信息：{message}\n\n请检查系统状态。")
}

pub fn system_ok_notice() -> String {
    "🧪 **系统测试消息**\n\nAI早报通知系统运行正常！".to_string()
}

/// Body used by the test mode around the newest episode's summary.
pub fn test_preview(summary: &str) -> String {
    format!("🧪 **测试通知** 🧪\n\n以下是最新的AI早报内容预览：\n\n{summary}")
}

pub fn startup_notice(interval_minutes: u64, uid: &str, at: &DateTime<FixedOffset>) -> String {
    format!(
        "🚀 AI早报监控系统已启动\n⏰ 检查间隔: {interval_minutes}分钟\n📺 监控UP主: {uid}\n🕐 启动时间: {}",
        at.format(TIME_FORMAT)
    )
}

pub fn shutdown_notice(at: &DateTime<FixedOffset>) -> String {
    format!("🛑 AI早报监控系统已停止\n🕐 停止时间: {}", at.format(TIME_FORMAT))
}

pub fn daily_push_notice(delivered: usize, at: &DateTime<FixedOffset>) -> String {
    format!(
        "📰 每日AI早报推送完成\n📬 本次推送: {delivered}条\n🕐 推送时间: {}",
        at.format(TIME_FORMAT)
    )
}
