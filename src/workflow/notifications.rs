// Dismissible user notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{IntegrityWarning, WorkflowError};

/// Oldest notifications are dropped beyond this
pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    /// `WorkflowError::kind` of the failure behind an error notification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            level,
            title: title.into(),
            message: message.into(),
            error_kind: None,
            created_at: Utc::now(),
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }
}

/// Bounded FIFO of notifications awaiting dismissal
#[derive(Debug, Clone, Default)]
pub struct NotificationQueue {
    items: VecDeque<Notification>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: Notification) -> &Notification {
        if self.items.len() == MAX_NOTIFICATIONS {
            self.items.pop_front();
        }
        self.items.push_back(notification);
        &self.items[self.items.len() - 1]
    }

    /// Push an error notification and, when the server supplied one, a
    /// separate hint notification. Returns the pushed notifications.
    pub fn push_error(&mut self, title: &str, err: &WorkflowError) -> Vec<Notification> {
        let mut notification = Notification::error(title, err.user_message());
        notification.error_kind = Some(err.kind().to_string());
        let mut pushed = vec![self.push(notification).clone()];
        if let Some(hint) = err.hint() {
            pushed.push(self.push(Notification::info("Hint", hint)).clone());
        }
        pushed
    }

    pub fn push_integrity(&mut self, warning: &IntegrityWarning) -> Notification {
        self.push(Notification::warning(
            "The generated document may be damaged",
            warning.to_string(),
        ))
        .clone()
    }

    /// Remove a notification; returns whether it existed
    pub fn dismiss(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }
}
