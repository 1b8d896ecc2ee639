use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{TaskId, UserId};

/// A sub-activity (checklist item) inside a task.
/// Has no identifier of its own — it is addressed by position.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Activity {
    pub text: String,
    pub completed: bool,
}

impl Activity {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A task document as persisted by the store.
///
/// Field names are part of the stored document shape and must not
/// change: `userId` and `createdAt` are camelCase, everything else is
/// a single lowercase word.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    /// Checklist completion percentage, rounded to the nearest integer.
    /// A task with no checklist is vacuously complete.
    pub fn progress(&self) -> u8 {
        if self.activities.is_empty() {
            return 100;
        }
        let done = self.activities.iter().filter(|a| a.completed).count();
        ((done as f64 / self.activities.len() as f64) * 100.0).round() as u8
    }
}

/// Creation payload. The store assigns `id` and `createdAt`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub status: TaskStatus,
}

/// Partial update. Only supplied fields are changed; `userId`,
/// `createdAt`, and `status` are never patched through this surface.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activities: Option<Vec<Activity>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.activities.is_none()
    }

    /// Patch carrying only a replacement activities array.
    pub fn activities(activities: Vec<Activity>) -> Self {
        Self {
            activities: Some(activities),
            ..Self::default()
        }
    }
}
