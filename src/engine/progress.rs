use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::settlement;
use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::earnings::EarningsRecord;
use crate::models::event::{JobEvent, Milestone};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StepOutcome {
    pub event_id: Uuid,
    pub assignment_status: AssignmentStatus,
    /// Present only when this step sealed (or re-read) the settlement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earnings: Option<EarningsRecord>,
}

/// Records a milestone step for a job. The event is appended for every
/// authorized step, known or not; assignment status only moves when a
/// projection rule fires, and the terminal milestone settles the
/// assignment synchronously before returning.
pub async fn record_step(
    state: &AppState,
    job_id: Uuid,
    driver_id: Uuid,
    step: Milestone,
    note: Option<String>,
    payload: serde_json::Value,
) -> Result<StepOutcome, AppError> {
    let job_driver = {
        let job = state
            .jobs
            .get(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;
        job.driver_id
    };

    let now = Utc::now();
    let ttl = Duration::minutes(state.config.offer_ttl_minutes);

    // Authorization, lazy healing and projection all happen under the
    // job's assignment entry lock so concurrent steps serialize.
    let assignment = match state.assignments.entry(job_id) {
        Entry::Occupied(mut occupied) => {
            let bound_via_job = job_driver == Some(driver_id);
            let bound_via_assignment = occupied.get().driver_id == driver_id;
            if !bound_via_job && !bound_via_assignment {
                return Err(AppError::Forbidden(format!(
                    "driver {driver_id} is not bound to job {job_id}"
                )));
            }

            let assignment = occupied.get_mut();
            project_status(assignment, &step, now);
            assignment.clone()
        }
        Entry::Vacant(vacant) => {
            // Jobs bound directly through Job.driver_id by older assignment
            // paths have no row here yet; heal on first step instead of
            // failing the driver.
            if job_driver != Some(driver_id) {
                return Err(AppError::Forbidden(format!(
                    "driver {driver_id} is not bound to job {job_id}"
                )));
            }

            let mut assignment = Assignment {
                id: Uuid::new_v4(),
                job_id,
                driver_id,
                status: AssignmentStatus::Accepted,
                round: 1,
                created_at: now,
                expires_at: now + ttl,
                claimed_at: Some(now),
            };
            project_status(&mut assignment, &step, now);
            vacant.insert(assignment).clone()
        }
    };

    let event = JobEvent {
        id: Uuid::new_v4(),
        job_id,
        assignment_id: assignment.id,
        step: step.clone(),
        note,
        actor_id: driver_id,
        recorded_at: now,
        payload,
    };
    let event_id = event.id;
    state.events.insert(event.id, event);

    state
        .metrics
        .job_steps_total
        .with_label_values(&[step.as_str()])
        .inc();

    info!(
        job_id = %job_id,
        driver_id = %driver_id,
        step = step.as_str(),
        status = ?assignment.status,
        "job step recorded"
    );

    let earnings = if step == Milestone::JobCompleted
        && assignment.status == AssignmentStatus::Completed
    {
        Some(settlement::settle(state, &assignment).await?)
    } else {
        None
    };

    Ok(StepOutcome {
        event_id,
        assignment_status: assignment.status,
        earnings,
    })
}

/// The projection rules. Everything else, including unknown steps, is an
/// informational checkpoint that leaves status alone.
fn project_status(assignment: &mut Assignment, step: &Milestone, now: chrono::DateTime<Utc>) {
    match step {
        Milestone::NavigateToPickup if assignment.status == AssignmentStatus::Invited => {
            assignment.apply(AssignmentStatus::Accepted, now);
        }
        Milestone::JobCompleted => {
            assignment.apply(AssignmentStatus::Completed, now);
        }
        _ => {}
    }
}
