use chrono::{DateTime, Utc};
use rusqlite::Row;

use taskdeck_core::{Activity, Task, TaskDraft, TaskId, TaskPatch, UserId};

use crate::database::Database;
use crate::error::StoreError;

/// Repository for task documents. Ids and creation timestamps are
/// assigned here, never by the caller.
pub struct TaskRepo {
    db: Database,
}

impl TaskRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new task from a draft. Assigns `id` and `created_at`.
    pub fn insert(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        let id = TaskId::new();
        let now = Utc::now();
        let activities_json = serde_json::to_string(&draft.activities)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (id, title, description, priority, user_id, created_at, activities, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id.as_str(),
                    draft.title,
                    draft.description,
                    draft.priority.to_string(),
                    draft.user_id.as_str(),
                    now.to_rfc3339(),
                    activities_json,
                    draft.status.to_string(),
                ],
            )?;

            Ok(Task {
                id: id.clone(),
                title: draft.title.clone(),
                description: draft.description.clone(),
                priority: draft.priority,
                user_id: draft.user_id.clone(),
                created_at: now,
                activities: draft.activities.clone(),
                status: draft.status,
            })
        })
    }

    /// Get a task by id.
    pub fn get(&self, id: &TaskId) -> Result<Task, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, description, priority, user_id, created_at, activities, status
                 FROM tasks WHERE id = ?1",
                [id.as_str()],
                row_to_task,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("task {id}")),
                other => StoreError::Database(other.to_string()),
            })
        })
    }

    /// All tasks owned by a user, newest first.
    pub fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Task>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, priority, user_id, created_at, activities, status
                 FROM tasks WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([owner.as_str()], row_to_task)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply a partial patch. Only supplied fields are written.
    pub fn update_partial(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }

        let activities_json = patch
            .activities
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.db.with_conn(|conn| {
            let mut sets: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(title) = &patch.title {
                sets.push(format!("title = ?{}", params.len() + 1));
                params.push(Box::new(title.clone()));
            }
            if let Some(description) = &patch.description {
                sets.push(format!("description = ?{}", params.len() + 1));
                params.push(Box::new(description.clone()));
            }
            if let Some(priority) = &patch.priority {
                sets.push(format!("priority = ?{}", params.len() + 1));
                params.push(Box::new(priority.to_string()));
            }
            if let Some(json) = &activities_json {
                sets.push(format!("activities = ?{}", params.len() + 1));
                params.push(Box::new(json.clone()));
            }

            let sql = format!(
                "UPDATE tasks SET {} WHERE id = ?{}",
                sets.join(", "),
                params.len() + 1
            );
            params.push(Box::new(id.as_str().to_string()));

            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let rows = conn.execute(&sql, param_refs.as_slice())?;
            if rows == 0 {
                return Err(StoreError::NotFound(format!("task {id}")));
            }
            Ok(())
        })
    }

    /// Delete a task by id.
    pub fn delete(&self, id: &TaskId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM tasks WHERE id = ?1", [id.as_str()])?;
            if rows == 0 {
                return Err(StoreError::NotFound(format!("task {id}")));
            }
            Ok(())
        })
    }

    /// Count tasks owned by a user.
    pub fn count_for_owner(&self, owner: &UserId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE user_id = ?1",
                [owner.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Database(e.to_string()))
        })
    }
}

fn row_to_task(row: &Row<'_>) -> Result<Task, rusqlite::Error> {
    let created_at: String = row.get(5)?;
    let created_at = created_at
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|_| Utc::now());
    let activities: Vec<Activity> =
        serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default();

    Ok(Task {
        id: TaskId::from_raw(row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        priority: row.get::<_, String>(3)?.parse().unwrap_or_default(),
        user_id: UserId::from_raw(row.get::<_, String>(4)?),
        created_at,
        activities,
        status: row.get::<_, String>(7)?.parse().unwrap_or_default(),
    })
}
