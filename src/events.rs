// Event types and payload structures for shell updates
// These are broadcast to every subscriber of a workflow

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::workflow::notifications::Notification;

// Event name constants
pub const EVENT_PHASE_CHANGED: &str = "workflow:phase_changed";
pub const EVENT_NOTIFICATION: &str = "workflow:notification";
pub const EVENT_ARTIFACT_READY: &str = "workflow:artifact_ready";
pub const EVENT_RESET: &str = "workflow:reset";

/// Payload for phase change events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseChangedPayload {
    /// "interactive" or "auto"
    pub path: String,
    pub old_phase: String,
    pub new_phase: String,
    pub session_id: Option<String>,
    pub report_key: String,
}

/// Payload for notification events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub report_key: String,
    pub notification: Notification,
}

/// Payload for artifact ready events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReadyPayload {
    pub report_key: String,
    pub spreadsheet_name: Option<String>,
    pub document_name: Option<String>,
    pub preview_url: Option<String>,
    /// True when an integrity warning was raised
    pub suspect: bool,
}

/// Payload for reset events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPayload {
    pub report_key: String,
    /// Generation after the reset; older in-flight results are discarded
    pub generation: u64,
}

/// A workflow event delivered to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    /// Event type (e.g., "workflow:phase_changed")
    pub event: String,
    /// Event payload as JSON value
    pub payload: serde_json::Value,
}

/// Broadcasts workflow events to all subscribers
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventBroadcaster {
    /// Create a new event broadcaster with a channel capacity of 256 events
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast(&self, event_type: &str, payload: impl Serialize) {
        let event = WorkflowEvent {
            event: event_type.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        };

        // Ignore send errors (no receivers)
        let _ = self.tx.send(event);
    }

    /// Subscribe to events (returns a receiver)
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
