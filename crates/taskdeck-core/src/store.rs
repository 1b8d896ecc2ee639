use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::errors::TaskError;
use crate::ids::{TaskId, UserId};
use crate::task::{Task, TaskDraft, TaskPatch};

/// Events delivered on a live task query.
///
/// Every `Snapshot` is a full replacement collection, never a diff.
/// `Error` means the live query terminated abnormally; no further
/// events follow it.
#[derive(Clone, Debug)]
pub enum QueryEvent {
    Snapshot { tasks: Vec<Task> },
    Error { error: SubscriptionErrorInfo },
}

impl QueryEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Lightweight error info carried in-stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&TaskError> for SubscriptionErrorInfo {
    fn from(e: &TaskError) -> Self {
        Self {
            kind: e.error_kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// Releases the underlying live query when dropped.
pub struct SubscriptionGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Guard with nothing to release (testing / fixed streams).
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

pin_project_lite::pin_project! {
    /// A live task query: a stream of [`QueryEvent`]s plus the guard
    /// that keeps the query registered. Dropping the subscription
    /// releases the query.
    #[derive(Debug)]
    pub struct TaskSubscription {
        #[pin]
        events: UnboundedReceiverStream<QueryEvent>,
        _guard: SubscriptionGuard,
    }
}

impl TaskSubscription {
    pub fn new(events: mpsc::UnboundedReceiver<QueryEvent>, guard: SubscriptionGuard) -> Self {
        Self {
            events: UnboundedReceiverStream::new(events),
            _guard: guard,
        }
    }
}

impl Stream for TaskSubscription {
    type Item = QueryEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().events.poll_next(cx)
    }
}

/// The task entity's view of the remote document store.
///
/// `subscribe_tasks` opens a live query filtered to the owner, ordered
/// by creation time descending. The one-shot calls resolve once; the
/// caller reconciles with the next snapshot.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn subscribe_tasks(&self, owner: &UserId) -> Result<TaskSubscription, TaskError>;

    /// Create a task; the store assigns `id` and `createdAt`.
    async fn create_task(&self, draft: TaskDraft) -> Result<TaskId, TaskError>;

    /// Partial patch; only supplied fields are changed.
    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<(), TaskError>;

    async fn delete_task(&self, id: &TaskId) -> Result<(), TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn terminal_classification() {
        let snap = QueryEvent::Snapshot { tasks: vec![] };
        assert!(!snap.is_terminal());

        let err = QueryEvent::Error {
            error: SubscriptionErrorInfo {
                kind: "subscription_error".into(),
                message: "gone".into(),
            },
        };
        assert!(err.is_terminal());
    }

    #[test]
    fn error_info_from_task_error() {
        let err = TaskError::Subscription("query dropped".into());
        let info = SubscriptionErrorInfo::from(&err);
        assert_eq!(info.kind, "subscription_error");
        assert!(info.message.contains("query dropped"));
    }

    #[test]
    fn guard_releases_on_drop() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);
        let guard = SubscriptionGuard::new(move || flag.store(true, Ordering::SeqCst));
        assert!(!released.load(Ordering::SeqCst));
        drop(guard);
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn subscription_streams_events_and_releases() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&released);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = TaskSubscription::new(
            rx,
            SubscriptionGuard::new(move || flag.store(true, Ordering::SeqCst)),
        );

        tx.send(QueryEvent::Snapshot { tasks: vec![] }).unwrap();
        let event = sub.next().await.unwrap();
        assert!(matches!(event, QueryEvent::Snapshot { .. }));

        drop(sub);
        assert!(released.load(Ordering::SeqCst));
    }
}
