//! Step controllers for the interactive and auto report paths
//!
//! Both controllers keep their state behind a `std::sync::Mutex` that is never
//! held across an `.await`. Every async step captures the workflow generation
//! when it starts and re-checks it after each suspension point; a reset bumps
//! the generation, so results arriving afterwards are dropped instead of
//! applied.

pub mod artifact;
pub mod auto;
pub mod interactive;
pub mod notifications;
pub mod phase;

#[cfg(test)]
mod tests;

pub use artifact::{artifact_file_name, materialize};
pub use auto::{AutoOutcome, AutoWorkflow, PendingNegotiation};
pub use interactive::InteractiveWorkflow;
pub use notifications::{Notification, NotificationLevel, NotificationQueue};
pub use phase::{AutoPhase, InteractivePhase, StateTransitionError};

use crate::events::{EventBroadcaster, NotificationPayload, PhaseChangedPayload, EVENT_NOTIFICATION, EVENT_PHASE_CHANGED};

/// Result of a step that may be gated or superseded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step ran and its result was applied
    Applied,
    /// Another step was in flight; nothing was dispatched
    Busy,
    /// Not allowed in the current phase; state is unchanged
    Blocked,
    /// The workflow was reset while the step was in flight; the result was dropped
    Discarded,
}

/// Fan notifications out to subscribers, if any
pub(crate) fn publish_notifications(
    events: Option<&EventBroadcaster>,
    report_key: &str,
    notifications: &[Notification],
) {
    let Some(events) = events else {
        return;
    };
    for notification in notifications {
        events.broadcast(
            EVENT_NOTIFICATION,
            NotificationPayload {
                report_key: report_key.to_string(),
                notification: notification.clone(),
            },
        );
    }
}

pub(crate) fn publish_phase_change(
    events: Option<&EventBroadcaster>,
    path: &str,
    report_key: &str,
    old_phase: &str,
    new_phase: &str,
    session_id: Option<&str>,
) {
    log::info!(
        "[{}] {} workflow: {} -> {} (session {})",
        report_key,
        path,
        old_phase,
        new_phase,
        session_id.unwrap_or("-")
    );
    if let Some(events) = events {
        events.broadcast(
            EVENT_PHASE_CHANGED,
            PhaseChangedPayload {
                path: path.to_string(),
                old_phase: old_phase.to_string(),
                new_phase: new_phase.to_string(),
                session_id: session_id.map(str::to_string),
                report_key: report_key.to_string(),
            },
        );
    }
}
