use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Events fanned out to the notification boundary (push/SMS/email delivery
/// lives behind it and is not this crate's concern). Fire-and-forget: a
/// publish failure never unwinds the state change that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    JobAssigned {
        job_id: Uuid,
        driver_id: Uuid,
        round: u32,
    },
    JobCancelled {
        job_id: Uuid,
        reason: Option<String>,
    },
    JobCompleted {
        job_id: Uuid,
        assignment_id: Uuid,
        driver_id: Uuid,
        net_pence: i64,
    },
}

pub fn emit(tx: &broadcast::Sender<NotificationEvent>, event: NotificationEvent) {
    // No subscribers is the common case when nothing is watching /ws.
    if let Err(err) = tx.send(event) {
        debug!(error = %err, "notification fanout has no listeners");
    }
}
