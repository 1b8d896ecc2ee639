use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

/// Severity of a user-facing notification. Presentation (toast, inline
/// banner) is the embedder's concern.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A user-facing notification published by the data layer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, title: title.into(), body: body.into() }
    }

    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, title: title.into(), body: body.into() }
    }

    pub fn warning(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, title: title.into(), body: body.into() }
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, title: title.into(), body: body.into() }
    }
}

/// Broadcast sender for notices. Lossy under lag — acceptable for
/// toast-style notifications.
#[derive(Clone)]
pub struct NoticeSender {
    tx: broadcast::Sender<Notice>,
}

impl NoticeSender {
    pub fn channel(capacity: usize) -> (Self, broadcast::Receiver<Notice>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn publish(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            warn!("no notice receivers — notice dropped");
        }
    }
}
