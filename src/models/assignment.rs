use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssignmentStatus {
    Invited,
    /// Transient pre-accept stage. No operation parks a row here; it exists
    /// as a wire state for the offered/claimed/completed accounting, and
    /// the claim itself is recorded in `claimed_at` when a row first
    /// leaves `Invited`.
    Claimed,
    Accepted,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssignmentStatus::Completed | AssignmentStatus::Cancelled)
    }
}

/// Outcome of a requested status transition. Disallowed transitions are a
/// recorded no-op, never a silent overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed(AssignmentStatus),
    Unchanged(AssignmentStatus),
}

/// The binding between one job and one driver attempt. Stored keyed by
/// `job_id`, which is what enforces at most one live assignment per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub job_id: Uuid,
    pub driver_id: Uuid,
    pub status: AssignmentStatus,
    pub round: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// Applies the state machine: `Invited -> Claimed -> Accepted ->
    /// Completed`, with cancellation allowed from any non-terminal state,
    /// and completion from any live state on the terminal milestone.
    /// Anything else leaves the status untouched.
    pub fn apply(&mut self, target: AssignmentStatus, now: DateTime<Utc>) -> Transition {
        use AssignmentStatus::*;

        let allowed = match (self.status, target) {
            (Invited, Claimed) => true,
            (Invited, Accepted) | (Claimed, Accepted) => true,
            (Invited, Completed) | (Claimed, Completed) | (Accepted, Completed) => true,
            (Invited, Cancelled) | (Claimed, Cancelled) | (Accepted, Cancelled) => true,
            _ => false,
        };

        if !allowed {
            return Transition::Unchanged(self.status);
        }

        // First departure from Invited is the claim, for acceptance-rate
        // accounting, even when the caller jumps straight to Accepted.
        if self.status == Invited && matches!(target, Claimed | Accepted) {
            self.claimed_at.get_or_insert(now);
        }

        self.status = target;
        Transition::Changed(target)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{Assignment, AssignmentStatus, Transition};

    fn assignment(status: AssignmentStatus) -> Assignment {
        let now = Utc::now();
        Assignment {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            driver_id: Uuid::new_v4(),
            status,
            round: 1,
            created_at: now,
            expires_at: now + chrono::Duration::minutes(30),
            claimed_at: None,
        }
    }

    #[test]
    fn invited_accepts_and_records_claim_time() {
        let mut a = assignment(AssignmentStatus::Invited);
        let outcome = a.apply(AssignmentStatus::Accepted, Utc::now());
        assert_eq!(outcome, Transition::Changed(AssignmentStatus::Accepted));
        assert!(a.claimed_at.is_some());
    }

    #[test]
    fn completed_is_terminal() {
        let mut a = assignment(AssignmentStatus::Completed);
        let outcome = a.apply(AssignmentStatus::Cancelled, Utc::now());
        assert_eq!(outcome, Transition::Unchanged(AssignmentStatus::Completed));
        assert_eq!(a.status, AssignmentStatus::Completed);
    }

    #[test]
    fn cancelled_cannot_be_revived() {
        let mut a = assignment(AssignmentStatus::Cancelled);
        let outcome = a.apply(AssignmentStatus::Accepted, Utc::now());
        assert_eq!(outcome, Transition::Unchanged(AssignmentStatus::Cancelled));
    }

    #[test]
    fn accepted_cannot_regress_to_invited() {
        let mut a = assignment(AssignmentStatus::Accepted);
        let outcome = a.apply(AssignmentStatus::Invited, Utc::now());
        assert_eq!(outcome, Transition::Unchanged(AssignmentStatus::Accepted));
    }

    #[test]
    fn completion_is_reachable_from_invited() {
        // A terminal milestone can arrive before any pickup step was logged.
        let mut a = assignment(AssignmentStatus::Invited);
        let outcome = a.apply(AssignmentStatus::Completed, Utc::now());
        assert_eq!(outcome, Transition::Changed(AssignmentStatus::Completed));
        // Jumping straight to Completed is not a claim.
        assert!(a.claimed_at.is_none());
    }

    #[test]
    fn existing_claim_time_is_preserved() {
        let mut a = assignment(AssignmentStatus::Claimed);
        let earlier = Utc::now() - chrono::Duration::minutes(5);
        a.claimed_at = Some(earlier);
        a.apply(AssignmentStatus::Accepted, Utc::now());
        assert_eq!(a.claimed_at, Some(earlier));
    }
}
