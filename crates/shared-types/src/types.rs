use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a background task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

/// Progress record polled by clients (`GET /progress/:task_id`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub percent: u8,
    pub message: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_file: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TaskProgress {
    pub fn queued() -> Self {
        Self {
            percent: 0,
            message: "Queued".to_string(),
            status: TaskStatus::Queued,
            result_file: None,
            updated_at: Utc::now(),
        }
    }

    pub fn running(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
            status: TaskStatus::Running,
            result_file: None,
            updated_at: Utc::now(),
        }
    }

    pub fn completed(result_file: impl Into<String>) -> Self {
        Self {
            percent: 100,
            message: "Report Ready!".to_string(),
            status: TaskStatus::Completed,
            result_file: Some(result_file.into()),
            updated_at: Utc::now(),
        }
    }

    pub fn failed(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
            status: TaskStatus::Error,
            result_file: None,
            updated_at: Utc::now(),
        }
    }
}
