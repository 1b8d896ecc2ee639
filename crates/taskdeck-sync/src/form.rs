use std::sync::Arc;

use tracing::{debug, warn};

use taskdeck_core::{
    Activity, Identity, Notice, NoticeSender, Priority, Task, TaskDraft, TaskError, TaskPatch,
    TaskStatus, TaskStore,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit,
}

/// Create/edit form state for one task.
///
/// The mode is fixed for the lifetime of one form: `create` starts
/// blank, `edit` seeds every field from the supplied task. Submission
/// dispatches to the matching store call; failures keep the fields in
/// place so the user can retry.
pub struct TaskForm {
    store: Arc<dyn TaskStore>,
    notices: NoticeSender,
    initial: Option<Task>,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    activities: Vec<Activity>,
    activity_input: String,
    on_saved: Option<Box<dyn Fn() + Send + Sync>>,
}

impl TaskForm {
    pub fn create(store: Arc<dyn TaskStore>, notices: NoticeSender) -> Self {
        Self {
            store,
            notices,
            initial: None,
            title: String::new(),
            description: String::new(),
            priority: Priority::default(),
            activities: Vec::new(),
            activity_input: String::new(),
            on_saved: None,
        }
    }

    pub fn edit(store: Arc<dyn TaskStore>, notices: NoticeSender, task: Task) -> Self {
        Self {
            store,
            notices,
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            activities: task.activities.clone(),
            activity_input: String::new(),
            initial: Some(task),
            on_saved: None,
        }
    }

    /// Called after a successful submit — typically closes the
    /// hosting dialog.
    pub fn with_on_saved(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_saved = Some(Box::new(callback));
        self
    }

    /// Fixed at construction: `Edit` when an initial task was
    /// supplied, `Create` otherwise.
    pub fn mode(&self) -> FormMode {
        if self.initial.is_some() {
            FormMode::Edit
        } else {
            FormMode::Create
        }
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn activity_input(&self) -> &str {
        &self.activity_input
    }

    pub fn set_activity_input(&mut self, text: impl Into<String>) {
        self.activity_input = text.into();
    }

    /// Append the pending input as a new unchecked activity. Empty
    /// input is ignored; a case-insensitive duplicate warns and leaves
    /// the list unchanged. On success the input field is cleared.
    pub fn add_activity(&mut self) {
        let text = self.activity_input.trim();
        if text.is_empty() {
            return;
        }
        let needle = text.to_lowercase();
        if self
            .activities
            .iter()
            .any(|a| a.text.to_lowercase() == needle)
        {
            warn!(text, "duplicate activity rejected");
            self.notices.publish(Notice::warning(
                "Duplicate activity",
                "That checklist item already exists.",
            ));
            return;
        }
        self.activities.push(Activity::new(text));
        self.activity_input.clear();
    }

    /// Remove by position. Out-of-range indices are ignored.
    pub fn remove_activity(&mut self, index: usize) {
        if index < self.activities.len() {
            self.activities.remove(index);
        }
    }

    /// Validate and dispatch to create or update. The returned error
    /// has already been surfaced as a notice; callers only need it for
    /// control flow.
    pub async fn submit(&mut self, identity: Option<&Identity>) -> Result<(), TaskError> {
        let Some(identity) = identity else {
            self.notices.publish(Notice::error(
                "Not signed in",
                "Sign in to save tasks.",
            ));
            return Err(TaskError::Unauthenticated);
        };

        let title = self.title.trim().to_string();
        if title.is_empty() {
            self.notices.publish(Notice::error(
                "Title required",
                "Give the task a title before saving.",
            ));
            return Err(TaskError::Validation("title must not be empty".into()));
        }

        match &self.initial {
            None => {
                let draft = TaskDraft {
                    title,
                    description: self.description.clone(),
                    priority: self.priority,
                    user_id: identity.user_id.clone(),
                    activities: self.activities.clone(),
                    status: TaskStatus::Pending,
                };
                match self.store.create_task(draft).await {
                    Ok(id) => {
                        debug!(task_id = %id, "task created from form");
                        self.notices
                            .publish(Notice::success("Task created", "Saved to your list."));
                        self.reset();
                        if let Some(cb) = &self.on_saved {
                            cb();
                        }
                        Ok(())
                    }
                    Err(e) => {
                        warn!(error = %e, "create from form failed");
                        self.notices
                            .publish(Notice::error("Could not create task", e.to_string()));
                        Err(e)
                    }
                }
            }
            Some(initial) => {
                let patch = TaskPatch {
                    title: Some(title),
                    description: Some(self.description.clone()),
                    priority: Some(self.priority),
                    activities: Some(self.activities.clone()),
                };
                match self.store.update_task(&initial.id, patch).await {
                    Ok(()) => {
                        self.notices
                            .publish(Notice::success("Task updated", "Changes saved."));
                        if let Some(cb) = &self.on_saved {
                            cb();
                        }
                        Ok(())
                    }
                    Err(e) => {
                        warn!(task_id = %initial.id, error = %e, "update from form failed");
                        self.notices
                            .publish(Notice::error("Could not update task", e.to_string()));
                        Err(e)
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.title.clear();
        self.description.clear();
        self.priority = Priority::default();
        self.activities.clear();
        self.activity_input.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use tokio::sync::broadcast;

    use taskdeck_core::{NoticeLevel, TaskId, TaskSubscription, UserId};

    struct RecordingStore {
        created: Mutex<Vec<TaskDraft>>,
        updated: Mutex<Vec<(TaskId, TaskPatch)>>,
        fail_with: Mutex<Option<TaskError>>,
    }

    impl RecordingStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                created: Mutex::new(Vec::new()),
                updated: Mutex::new(Vec::new()),
                fail_with: Mutex::new(None),
            })
        }

        fn fail_next(&self, error: TaskError) {
            *self.fail_with.lock() = Some(error);
        }

        fn mutation_count(&self) -> usize {
            self.created.lock().len() + self.updated.lock().len()
        }
    }

    #[async_trait]
    impl TaskStore for RecordingStore {
        async fn subscribe_tasks(&self, _owner: &UserId) -> Result<TaskSubscription, TaskError> {
            unreachable!("forms never subscribe")
        }

        async fn create_task(&self, draft: TaskDraft) -> Result<TaskId, TaskError> {
            if let Some(e) = self.fail_with.lock().take() {
                return Err(e);
            }
            self.created.lock().push(draft);
            Ok(TaskId::new())
        }

        async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<(), TaskError> {
            if let Some(e) = self.fail_with.lock().take() {
                return Err(e);
            }
            self.updated.lock().push((id.clone(), patch));
            Ok(())
        }

        async fn delete_task(&self, _id: &TaskId) -> Result<(), TaskError> {
            Ok(())
        }
    }

    fn identity() -> Identity {
        Identity {
            user_id: UserId::new(),
            email: "ana@example.com".into(),
            email_verified: true,
        }
    }

    fn existing_task(owner: &UserId) -> Task {
        Task {
            id: TaskId::new(),
            title: "Quarterly report".into(),
            description: "numbers and narrative".into(),
            priority: Priority::High,
            user_id: owner.clone(),
            created_at: Utc::now(),
            activities: vec![Activity::new("collect data")],
            status: TaskStatus::InProgress,
        }
    }

    async fn next_notice(rx: &mut broadcast::Receiver<Notice>) -> Notice {
        tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("no notice arrived")
            .unwrap()
    }

    #[test]
    fn add_activity_dedups_case_insensitively() {
        let store = RecordingStore::new();
        let (notices, mut notice_rx) = NoticeSender::channel(16);
        let mut form = TaskForm::create(store, notices);

        form.set_activity_input("Buy milk");
        form.add_activity();
        assert_eq!(form.activities().len(), 1);
        assert_eq!(form.activity_input(), "");

        form.set_activity_input("buy milk");
        form.add_activity();
        assert_eq!(form.activities().len(), 1);

        let notice = notice_rx.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Warning);
    }

    #[test]
    fn add_activity_trims_and_rejects_empty() {
        let store = RecordingStore::new();
        let (notices, mut notice_rx) = NoticeSender::channel(16);
        let mut form = TaskForm::create(store, notices);

        form.set_activity_input("   ");
        form.add_activity();
        assert!(form.activities().is_empty());
        assert!(notice_rx.try_recv().is_err(), "empty input must be silent");

        form.set_activity_input("  walk the dog  ");
        form.add_activity();
        assert_eq!(form.activities()[0].text, "walk the dog");
        assert!(!form.activities()[0].completed);
    }

    #[test]
    fn remove_activity_by_position() {
        let store = RecordingStore::new();
        let (notices, _rx) = NoticeSender::channel(16);
        let mut form = TaskForm::create(store, notices);

        for text in ["one", "two", "three"] {
            form.set_activity_input(text);
            form.add_activity();
        }
        form.remove_activity(1);
        let texts: Vec<&str> = form.activities().iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "three"]);

        // Out of range: no-op
        form.remove_activity(10);
        assert_eq!(form.activities().len(), 2);
    }

    #[tokio::test]
    async fn submit_requires_identity() {
        let store = RecordingStore::new();
        let (notices, mut notice_rx) = NoticeSender::channel(16);
        let mut form = TaskForm::create(Arc::clone(&store) as Arc<dyn TaskStore>, notices);
        form.title = "A task".into();

        let err = form.submit(None).await.unwrap_err();
        assert_eq!(err.error_kind(), "unauthenticated");
        assert_eq!(store.mutation_count(), 0);
        assert_eq!(next_notice(&mut notice_rx).await.level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn submit_rejects_blank_title() {
        let store = RecordingStore::new();
        let (notices, mut notice_rx) = NoticeSender::channel(16);
        let mut form = TaskForm::create(Arc::clone(&store) as Arc<dyn TaskStore>, notices);
        form.title = "   ".into();

        let me = identity();
        let err = form.submit(Some(&me)).await.unwrap_err();
        assert_eq!(err.error_kind(), "validation_error");
        assert_eq!(store.mutation_count(), 0);
        assert_eq!(next_notice(&mut notice_rx).await.level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn create_submits_draft_and_resets() {
        let store = RecordingStore::new();
        let (notices, mut notice_rx) = NoticeSender::channel(16);
        let saved = Arc::new(AtomicUsize::new(0));
        let saved_probe = Arc::clone(&saved);

        let mut form = TaskForm::create(Arc::clone(&store) as Arc<dyn TaskStore>, notices)
            .with_on_saved(move || {
                saved_probe.fetch_add(1, Ordering::SeqCst);
            });
        form.title = "  Plan the offsite  ".into();
        form.description = "venue, agenda".into();
        form.priority = Priority::High;
        form.set_activity_input("book venue");
        form.add_activity();

        let me = identity();
        form.submit(Some(&me)).await.unwrap();

        let created = store.created.lock();
        assert_eq!(created.len(), 1);
        let draft = &created[0];
        assert_eq!(draft.title, "Plan the offsite");
        assert_eq!(draft.description, "venue, agenda");
        assert_eq!(draft.priority, Priority::High);
        assert_eq!(draft.user_id, me.user_id);
        assert_eq!(draft.status, TaskStatus::Pending);
        assert_eq!(draft.activities.len(), 1);

        // Fields reset for the next task
        assert_eq!(form.title, "");
        assert_eq!(form.description, "");
        assert_eq!(form.priority, Priority::Medium);
        assert!(form.activities().is_empty());

        assert_eq!(saved.load(Ordering::SeqCst), 1);
        assert_eq!(next_notice(&mut notice_rx).await.level, NoticeLevel::Success);
    }

    #[tokio::test]
    async fn edit_patches_without_touching_ownership() {
        let store = RecordingStore::new();
        let (notices, _rx) = NoticeSender::channel(16);
        let me = identity();
        let task = existing_task(&me.user_id);

        let mut form = TaskForm::edit(
            Arc::clone(&store) as Arc<dyn TaskStore>,
            notices,
            task.clone(),
        );
        // Seeded from the task
        assert_eq!(form.mode(), FormMode::Edit);
        assert_eq!(form.title, "Quarterly report");
        assert_eq!(form.priority, Priority::High);
        assert_eq!(form.activities().len(), 1);

        form.title = "Quarterly report v2".into();
        form.submit(Some(&me)).await.unwrap();

        let updated = store.updated.lock();
        assert_eq!(updated.len(), 1);
        let (id, patch) = &updated[0];
        assert_eq!(id, &task.id);
        assert_eq!(patch.title.as_deref(), Some("Quarterly report v2"));
        assert!(patch.activities.is_some());
        // A patch can only carry title/description/priority/activities,
        // so ownership, creation time, and status stay untouched.
        let json = serde_json::to_value(patch).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert!(!keys.contains(&"userId"));
        assert!(!keys.contains(&"status"));
        assert!(!keys.contains(&"createdAt"));

        // Edit keeps the fields; the caller discards the form.
        assert_eq!(form.title, "Quarterly report v2");
    }

    #[tokio::test]
    async fn failures_keep_fields_for_retry() {
        let store = RecordingStore::new();
        let (notices, mut notice_rx) = NoticeSender::channel(16);
        let mut form = TaskForm::create(Arc::clone(&store) as Arc<dyn TaskStore>, notices);
        form.title = "Keep me".into();
        form.set_activity_input("step");
        form.add_activity();

        store.fail_next(TaskError::Remote("quota exceeded".into()));
        let me = identity();
        let err = form.submit(Some(&me)).await.unwrap_err();
        assert_eq!(err.error_kind(), "remote_failure");

        assert_eq!(form.title, "Keep me");
        assert_eq!(form.activities().len(), 1);
        let notice = next_notice(&mut notice_rx).await;
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.title.contains("create"), "context names create: {}", notice.title);
    }
}
