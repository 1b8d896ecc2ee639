use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use taskdeck_core::{
    TaskDraft, TaskError, TaskId, TaskPatch, TaskStore, TaskSubscription, UserId,
};

use crate::database::Database;
use crate::live::LiveQueryHub;
use crate::tasks::TaskRepo;

/// SQLite-backed implementation of the task store boundary.
///
/// Mutations commit through [`TaskRepo`], then fan out replacement
/// snapshots to every live query for the affected owner.
pub struct SqliteTaskStore {
    repo: TaskRepo,
    hub: Arc<LiveQueryHub>,
}

impl SqliteTaskStore {
    pub fn new(db: Database) -> Self {
        Self {
            repo: TaskRepo::new(db.clone()),
            hub: Arc::new(LiveQueryHub::new(db)),
        }
    }

    /// Number of live queries currently registered.
    pub fn active_subscriptions(&self) -> usize {
        self.hub.active()
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn subscribe_tasks(&self, owner: &UserId) -> Result<TaskSubscription, TaskError> {
        if owner.is_empty() {
            return Err(TaskError::Validation(
                "an owner id is required to subscribe to tasks".into(),
            ));
        }
        Ok(self.hub.register(owner)?)
    }

    async fn create_task(&self, draft: TaskDraft) -> Result<TaskId, TaskError> {
        let owner = draft.user_id.clone();
        let task = self.repo.insert(draft)?;
        debug!(task_id = %task.id, "task created");
        self.hub.notify_owner(&owner);
        Ok(task.id)
    }

    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<(), TaskError> {
        if id.is_empty() {
            return Err(TaskError::MissingId(
                "a task id is required to update a task".into(),
            ));
        }
        let owner = self.repo.get(id)?.user_id;
        self.repo.update_partial(id, &patch)?;
        debug!(task_id = %id, "task updated");
        self.hub.notify_owner(&owner);
        Ok(())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), TaskError> {
        if id.is_empty() {
            return Err(TaskError::MissingId(
                "a task id is required to delete a task".into(),
            ));
        }
        let owner = self.repo.get(id)?.user_id;
        self.repo.delete(id)?;
        debug!(task_id = %id, "task deleted");
        self.hub.notify_owner(&owner);
        Ok(())
    }
}
