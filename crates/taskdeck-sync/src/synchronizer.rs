use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use taskdeck_core::{
    Notice, NoticeSender, QueryEvent, Task, TaskId, TaskPatch, TaskStore,
};

use crate::optimistic::OptimisticTxn;
use crate::session::SessionState;

/// Where the board stands relative to its live query.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// No identity yet, or torn down.
    Idle,
    /// Subscription opening, first snapshot pending.
    Loading,
    /// Mirroring the last snapshot.
    Synced,
    /// Live query failed; `tasks` holds the last good snapshot.
    Error,
}

/// View state for one mounted dashboard. The task collection is a
/// verbatim mirror of the last snapshot, except while an optimistic
/// toggle is in flight.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BoardState {
    pub phase: SyncPhase,
    pub tasks: Vec<Task>,
    pub error: Option<String>,
    /// Set when the session has settled signed out: the embedder
    /// should navigate away from the dashboard.
    pub should_redirect: bool,
}

impl Default for BoardState {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            tasks: Vec::new(),
            error: None,
            should_redirect: false,
        }
    }
}

enum WaitOutcome {
    Changed,
    Cancelled,
    ProviderGone,
}

/// One dashboard's task list, kept in sync with the store.
///
/// Owns exactly one live subscription at a time, keyed by the current
/// identity. The driver task is guarded by a cancellation token;
/// every late callback checks it before touching state, so nothing
/// lands after teardown.
pub struct TaskBoard {
    store: Arc<dyn TaskStore>,
    notices: NoticeSender,
    state_tx: Arc<watch::Sender<BoardState>>,
    state_rx: watch::Receiver<BoardState>,
    cancel: CancellationToken,
}

impl TaskBoard {
    /// Mount a board over the session stream. The driver follows
    /// identity changes until `unmount` (or drop).
    pub fn mount(
        store: Arc<dyn TaskStore>,
        session_rx: watch::Receiver<SessionState>,
        notices: NoticeSender,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(BoardState::default());
        let state_tx = Arc::new(state_tx);
        let cancel = CancellationToken::new();

        let driver = Driver {
            store: Arc::clone(&store),
            state: Arc::clone(&state_tx),
            cancel: cancel.clone(),
        };
        tokio::spawn(driver.run(session_rx));

        Self {
            store,
            notices,
            state_tx,
            state_rx,
            cancel,
        }
    }

    /// A receiver over the board state.
    pub fn state(&self) -> watch::Receiver<BoardState> {
        self.state_rx.clone()
    }

    /// Tear down: release the live subscription and silence any
    /// in-flight callbacks.
    pub fn unmount(&self) {
        self.cancel.cancel();
    }

    /// Delete a task. Local state is not touched directly; the next
    /// snapshot reflects the removal.
    pub async fn delete_task(&self, id: &TaskId) {
        match self.store.delete_task(id).await {
            Ok(()) => {
                if self.cancel.is_cancelled() {
                    return;
                }
                self.notices
                    .publish(Notice::success("Task deleted", "The task was removed."));
            }
            Err(e) => {
                if self.cancel.is_cancelled() {
                    return;
                }
                error!(task_id = %id, error = %e, "delete failed");
                self.notices
                    .publish(Notice::error("Could not delete task", e.to_string()));
            }
        }
    }

    /// Flip one activity's completion state, optimistically.
    ///
    /// The flipped value is visible for the whole persist call; a
    /// failed persist restores the pre-toggle task and emits exactly
    /// one error notice. Unknown task or out-of-range index is a no-op.
    pub async fn toggle_activity(&self, task_id: &TaskId, index: usize) {
        let Some(task) = self
            .state_rx
            .borrow()
            .tasks
            .iter()
            .find(|t| &t.id == task_id)
            .cloned()
        else {
            debug!(task_id = %task_id, "toggle on unknown task ignored");
            return;
        };
        if index >= task.activities.len() {
            debug!(task_id = %task_id, index, "toggle index out of range ignored");
            return;
        }

        let mut updated = task.clone();
        updated.activities[index].completed = !updated.activities[index].completed;
        let patch = TaskPatch::activities(updated.activities.clone());

        let apply_state = Arc::clone(&self.state_tx);
        let restore_state = Arc::clone(&self.state_tx);
        let restore_cancel = self.cancel.clone();

        let result = OptimisticTxn::begin(&task)
            .run(
                move || replace_task(&apply_state, updated),
                self.store.update_task(task_id, patch),
                move |snapshot| {
                    if !restore_cancel.is_cancelled() {
                        replace_task(&restore_state, snapshot);
                    }
                },
            )
            .await;

        if self.cancel.is_cancelled() {
            return;
        }
        match result {
            Ok(()) => {
                self.notices
                    .publish(Notice::info("Activity updated", "Change saved."));
            }
            Err(e) => {
                warn!(task_id = %task_id, index, error = %e, "activity toggle rolled back");
                self.notices
                    .publish(Notice::error("Could not update activity", e.to_string()));
            }
        }
    }
}

impl Drop for TaskBoard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn replace_task(state: &watch::Sender<BoardState>, task: Task) {
    state.send_modify(|s| {
        if let Some(pos) = s.tasks.iter().position(|t| t.id == task.id) {
            s.tasks[pos] = task;
        }
    });
}

/// The subscription lifecycle: follows the session stream, opening one
/// live query per signed-in identity and releasing it on every exit
/// path.
struct Driver {
    store: Arc<dyn TaskStore>,
    state: Arc<watch::Sender<BoardState>>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(self, mut session_rx: watch::Receiver<SessionState>) {
        loop {
            let session = session_rx.borrow_and_update().clone();

            if session.loading {
                match self.wait_for_change(&mut session_rx).await {
                    WaitOutcome::Changed => continue,
                    WaitOutcome::Cancelled => return self.settle_idle(false),
                    WaitOutcome::ProviderGone => return self.settle_idle(true),
                }
            }

            let Some(identity) = session.identity else {
                // Signed out after loading settled: clear and redirect.
                self.settle_idle(true);
                match self.wait_for_change(&mut session_rx).await {
                    WaitOutcome::Changed => continue,
                    WaitOutcome::Cancelled | WaitOutcome::ProviderGone => return,
                }
            };

            self.state.send_modify(|s| {
                s.phase = SyncPhase::Loading;
                s.error = None;
                s.should_redirect = false;
            });

            let mut sub = match self.store.subscribe_tasks(&identity.user_id).await {
                Ok(sub) => sub,
                Err(e) => {
                    error!(user_id = %identity.user_id, error = %e, "could not open live query");
                    self.state.send_modify(|s| {
                        s.phase = SyncPhase::Error;
                        s.error = Some(e.to_string());
                    });
                    match self.wait_for_change(&mut session_rx).await {
                        WaitOutcome::Changed => continue,
                        WaitOutcome::Cancelled => return self.settle_idle(false),
                        WaitOutcome::ProviderGone => return self.settle_idle(true),
                    }
                }
            };
            debug!(user_id = %identity.user_id, "live query open");

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        drop(sub);
                        return self.settle_idle(false);
                    }
                    changed = session_rx.changed() => {
                        if changed.is_err() {
                            drop(sub);
                            return self.settle_idle(true);
                        }
                        let same = session_rx
                            .borrow()
                            .identity
                            .as_ref()
                            .map(|i| &i.user_id)
                            == Some(&identity.user_id);
                        if !same {
                            // Identity changed or cleared: release the
                            // query before anything else runs.
                            drop(sub);
                            break;
                        }
                    }
                    event = sub.next() => {
                        let terminated = match event {
                            Some(QueryEvent::Snapshot { tasks }) => {
                                self.state.send_modify(|s| {
                                    s.phase = SyncPhase::Synced;
                                    s.tasks = tasks;
                                    s.error = None;
                                });
                                None
                            }
                            Some(QueryEvent::Error { error }) => Some(error.message),
                            None => Some("live query closed by the store".to_string()),
                        };

                        if let Some(message) = terminated {
                            warn!(user_id = %identity.user_id, %message, "live query terminated");
                            // Last good snapshot stays visible.
                            self.state.send_modify(|s| {
                                s.phase = SyncPhase::Error;
                                s.error = Some(message);
                            });
                            drop(sub);
                            match self.wait_for_change(&mut session_rx).await {
                                WaitOutcome::Changed => break,
                                WaitOutcome::Cancelled => return self.settle_idle(false),
                                WaitOutcome::ProviderGone => return self.settle_idle(true),
                            }
                        }
                    }
                }
            }
        }
    }

    async fn wait_for_change(&self, session_rx: &mut watch::Receiver<SessionState>) -> WaitOutcome {
        tokio::select! {
            _ = self.cancel.cancelled() => WaitOutcome::Cancelled,
            changed = session_rx.changed() => match changed {
                Ok(()) => WaitOutcome::Changed,
                Err(_) => WaitOutcome::ProviderGone,
            },
        }
    }

    fn settle_idle(&self, redirect: bool) {
        self.state.send_modify(|s| {
            s.phase = SyncPhase::Idle;
            s.tasks.clear();
            s.error = None;
            if redirect {
                s.should_redirect = true;
            }
        });
    }
}
