use std::time::Instant;

use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentStatus};
use crate::models::driver::{DriverStatus, OnboardingStatus};
use crate::models::job::JobStatus;
use crate::notify::{self, NotificationEvent};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AssignOptions {
    pub driver_id: Option<Uuid>,
    #[serde(default)]
    pub auto_assign: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkError {
    pub job_id: Uuid,
    pub error: String,
    pub reason: Option<String>,
}

impl BulkError {
    fn new(job_id: Uuid, err: &AppError) -> Self {
        Self {
            job_id,
            error: err.to_string(),
            reason: err.reason_code().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BulkAssignResult {
    pub assigned: Vec<Assignment>,
    pub errors: Vec<BulkError>,
}

#[derive(Debug, Serialize)]
pub struct BulkCancelResult {
    pub cancelled: Vec<Uuid>,
    pub errors: Vec<BulkError>,
}

/// Derived at read time from the job store, never cached on the driver.
pub fn active_job_count(state: &AppState, driver_id: Uuid) -> usize {
    state
        .jobs
        .iter()
        .filter(|entry| {
            let job = entry.value();
            job.driver_id == Some(driver_id) && job.status == JobStatus::Confirmed
        })
        .count()
}

#[derive(Debug, Serialize)]
pub struct DriverPerformance {
    pub offered: usize,
    pub claimed: usize,
    pub completed: usize,
    /// claimed / offered
    pub acceptance_rate: f64,
    /// completed / claimed
    pub completion_rate: f64,
    pub active_jobs: usize,
}

/// Three-stage performance read: offers, claims, completions. The two
/// ratios have different denominators on purpose; collapsing them into one
/// number loses the distinction between a driver who ignores offers and a
/// driver who claims work and drops it.
pub fn driver_performance(state: &AppState, driver_id: Uuid) -> DriverPerformance {
    let mut offered = 0usize;
    let mut claimed = 0usize;
    let mut completed = 0usize;

    for entry in state.assignments.iter() {
        let assignment = entry.value();
        if assignment.driver_id != driver_id {
            continue;
        }
        offered += 1;
        if assignment.claimed_at.is_some() {
            claimed += 1;
        }
        if assignment.status == AssignmentStatus::Completed {
            completed += 1;
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

    DriverPerformance {
        offered,
        claimed,
        completed,
        acceptance_rate: ratio(claimed, offered),
        completion_rate: ratio(completed, claimed),
        active_jobs: active_job_count(state, driver_id),
    }
}

/// Auto-assign candidate selection: online approved drivers ranked by
/// rating (desc) with account age (asc) as tie-break, then the load cap is
/// applied in rank order and the first survivor wins.
fn pick_auto_driver(state: &AppState) -> Result<Uuid, AppError> {
    let mut candidates: Vec<(Uuid, f64, chrono::DateTime<Utc>)> = state
        .drivers
        .iter()
        .filter(|entry| {
            let driver = entry.value();
            driver.status == DriverStatus::Online
                && driver.onboarding_status == OnboardingStatus::Approved
        })
        .map(|entry| {
            let driver = entry.value();
            (driver.id, driver.rating, driver.created_at)
        })
        .collect();

    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));

    candidates
        .into_iter()
        .map(|(id, _, _)| id)
        .find(|id| active_job_count(state, *id) < state.config.driver_load_cap)
        .ok_or(AppError::NoAvailableDriver)
}

/// Rejects terminal jobs and returns a pre-change snapshot for the audit
/// trail. Callers hold the job's assignment entry lock.
fn snapshot_open_job(state: &AppState, job_id: Uuid) -> Result<serde_json::Value, AppError> {
    let job = state
        .jobs
        .get(&job_id)
        .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

    match job.status {
        JobStatus::Cancelled => return Err(AppError::already_cancelled(job_id)),
        JobStatus::Completed => {
            return Err(AppError::Conflict {
                code: "already_completed",
                message: format!("job {job_id} is already completed"),
            });
        }
        JobStatus::Draft | JobStatus::Confirmed => {}
    }

    serde_json::to_value(job.value())
        .map_err(|err| AppError::Internal(format!("failed to snapshot job: {err}")))
}

fn confirm_job(
    state: &AppState,
    job_id: Uuid,
    driver_id: Uuid,
) -> Result<serde_json::Value, AppError> {
    let mut job = state
        .jobs
        .get_mut(&job_id)
        .ok_or_else(|| AppError::NotFound(format!("job {job_id} disappeared")))?;
    job.status = JobStatus::Confirmed;
    job.driver_id = Some(driver_id);
    serde_json::to_value(job.value())
        .map_err(|err| AppError::Internal(format!("failed to snapshot job: {err}")))
}

/// Assigns one job. The upsert runs under the assignment map's entry lock
/// for the job id, so of two racing callers the second observes the live
/// row and fails with `already_assigned` instead of overwriting.
pub fn assign_one(
    state: &AppState,
    job_id: Uuid,
    opts: &AssignOptions,
) -> Result<Assignment, AppError> {
    let chosen_driver = match opts.driver_id {
        Some(driver_id) => {
            if !state.drivers.contains_key(&driver_id) {
                return Err(AppError::NotFound(format!("driver {driver_id} not found")));
            }
            driver_id
        }
        None if opts.auto_assign => pick_auto_driver(state)?,
        None => {
            return Err(AppError::BadRequest(
                "driver_id is required unless auto_assign is set".to_string(),
            ));
        }
    };

    let now = Utc::now();
    let expires_at = now + Duration::minutes(state.config.offer_ttl_minutes);

    // The job-status check and the job write both happen under this entry
    // lock, so racing assigns and cancels on one job serialize. Lock order
    // is assignments before jobs everywhere that holds both.
    let (assignment, before, after) = match state.assignments.entry(job_id) {
        Entry::Occupied(mut occupied) => {
            if !occupied.get().status.is_terminal() && !opts.auto_assign {
                return Err(AppError::already_assigned(job_id));
            }
            let before = snapshot_open_job(state, job_id)?;
            // Re-offer: same row, next round, lifecycle restarts.
            let row = occupied.get_mut();
            row.driver_id = chosen_driver;
            row.status = AssignmentStatus::Invited;
            row.round += 1;
            row.expires_at = expires_at;
            row.claimed_at = None;
            let assignment = row.clone();
            let after = confirm_job(state, job_id, chosen_driver)?;
            (assignment, before, after)
        }
        Entry::Vacant(vacant) => {
            let before = snapshot_open_job(state, job_id)?;
            let assignment = vacant
                .insert(Assignment {
                    id: Uuid::new_v4(),
                    job_id,
                    driver_id: chosen_driver,
                    status: AssignmentStatus::Invited,
                    round: 1,
                    created_at: now,
                    expires_at,
                    claimed_at: None,
                })
                .clone();
            let after = confirm_job(state, job_id, chosen_driver)?;
            (assignment, before, after)
        }
    };

    state.record_audit(job_id, "assign", before, after, opts.reason.clone());

    notify::emit(
        &state.notifications_tx,
        NotificationEvent::JobAssigned {
            job_id,
            driver_id: chosen_driver,
            round: assignment.round,
        },
    );

    info!(
        job_id = %job_id,
        driver_id = %chosen_driver,
        round = assignment.round,
        "job assigned"
    );

    Ok(assignment)
}

/// Bulk assignment. Items are independent transactions: one failure never
/// rolls back or aborts its siblings.
pub fn assign_jobs(state: &AppState, job_ids: &[Uuid], opts: &AssignOptions) -> BulkAssignResult {
    let mut assigned = Vec::new();
    let mut errors = Vec::new();

    for &job_id in job_ids {
        let start = Instant::now();
        match assign_one(state, job_id, opts) {
            Ok(assignment) => {
                record_dispatch_metrics(state, "success", start);
                assigned.push(assignment);
            }
            Err(err) => {
                let outcome = match &err {
                    AppError::Conflict { .. } => "conflict",
                    AppError::NoAvailableDriver => "no_driver",
                    _ => "error",
                };
                record_dispatch_metrics(state, outcome, start);
                errors.push(BulkError::new(job_id, &err));
            }
        }
    }

    BulkAssignResult { assigned, errors }
}

/// Bulk cancel. Re-cancelling is an idempotent per-item failure; a live
/// assignment takes its own abort transition.
pub fn cancel_jobs(state: &AppState, job_ids: &[Uuid], reason: Option<String>) -> BulkCancelResult {
    let mut cancelled = Vec::new();
    let mut errors = Vec::new();

    for &job_id in job_ids {
        match cancel_one(state, job_id, reason.clone()) {
            Ok(()) => cancelled.push(job_id),
            Err(err) => errors.push(BulkError::new(job_id, &err)),
        }
    }

    BulkCancelResult { cancelled, errors }
}

fn cancel_one(state: &AppState, job_id: Uuid, reason: Option<String>) -> Result<(), AppError> {
    let now = Utc::now();

    // Same entry lock and the same assignments-then-jobs order as
    // assign_one, so a cancel can never interleave with an assign on this
    // job and leave a cancelled job holding a live offer.
    let (before, after) = match state.assignments.entry(job_id) {
        Entry::Occupied(mut occupied) => {
            let snapshots = cancel_job_row(state, job_id)?;
            occupied.get_mut().apply(AssignmentStatus::Cancelled, now);
            snapshots
        }
        Entry::Vacant(_) => cancel_job_row(state, job_id)?,
    };

    state.record_audit(job_id, "cancel", before, after, reason.clone());

    notify::emit(
        &state.notifications_tx,
        NotificationEvent::JobCancelled { job_id, reason },
    );

    info!(job_id = %job_id, "job cancelled");
    Ok(())
}

fn cancel_job_row(
    state: &AppState,
    job_id: Uuid,
) -> Result<(serde_json::Value, serde_json::Value), AppError> {
    let mut job = state
        .jobs
        .get_mut(&job_id)
        .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

    if job.status == JobStatus::Cancelled {
        return Err(AppError::already_cancelled(job_id));
    }

    let before = serde_json::to_value(job.value())
        .map_err(|err| AppError::Internal(format!("failed to snapshot job: {err}")))?;
    job.status = JobStatus::Cancelled;
    let after = serde_json::to_value(job.value())
        .map_err(|err| AppError::Internal(format!("failed to snapshot job: {err}")))?;
    Ok((before, after))
}

fn record_dispatch_metrics(state: &AppState, outcome: &str, start: Instant) {
    state
        .metrics
        .dispatch_total
        .with_label_values(&[outcome])
        .inc();
    state
        .metrics
        .dispatch_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{AssignOptions, assign_jobs, assign_one, cancel_jobs, driver_performance};
    use crate::config::Config;
    use crate::error::AppError;
    use crate::models::assignment::AssignmentStatus;
    use crate::models::driver::{ComplianceDocs, Driver, DriverStatus, OnboardingStatus};
    use crate::models::job::{GeoPoint, Job, JobStatus};
    use crate::state::AppState;

    fn state() -> AppState {
        AppState::new(Config::default())
    }

    fn test_driver(rating: f64, created_offset_hours: i64) -> Driver {
        let now = Utc::now();
        let next_year = (now + Duration::days(365)).date_naive();
        Driver {
            id: Uuid::new_v4(),
            name: "Driver".to_string(),
            status: DriverStatus::Online,
            onboarding_status: OnboardingStatus::Approved,
            compliance: ComplianceDocs {
                license_expires: next_year,
                insurance_expires: next_year,
                right_to_work_expires: next_year,
                vehicle_check_expires: None,
                documents_complete: true,
            },
            rating,
            points: 0,
            location: None,
            created_at: now - Duration::hours(created_offset_hours),
            updated_at: now,
        }
    }

    fn test_job() -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            reference: "MV-2001".to_string(),
            origin: GeoPoint {
                lat: 51.5,
                lng: -0.1,
            },
            origin_label: "origin".to_string(),
            destination: GeoPoint {
                lat: 52.0,
                lng: -0.3,
            },
            destination_label: "destination".to_string(),
            scheduled_at: now + Duration::hours(6),
            crew_size: 2,
            distance_miles: 40.0,
            estimated_duration_hours: 2.0,
            gross_price_pence: 15_000,
            surge_pence: 0,
            status: JobStatus::Confirmed,
            driver_id: None,
            created_at: now,
        }
    }

    fn insert_job(state: &AppState) -> Uuid {
        let job = test_job();
        let id = job.id;
        state.jobs.insert(id, job);
        id
    }

    fn assigned_job(state: &AppState, driver_id: Uuid) -> Uuid {
        let mut job = test_job();
        job.driver_id = Some(driver_id);
        let id = job.id;
        state.jobs.insert(id, job);
        id
    }

    #[test]
    fn manual_assign_creates_invited_assignment() {
        let state = state();
        let driver = test_driver(4.5, 0);
        let driver_id = driver.id;
        state.drivers.insert(driver_id, driver);
        let job_id = insert_job(&state);

        let opts = AssignOptions {
            driver_id: Some(driver_id),
            auto_assign: false,
            reason: None,
        };
        let assignment = assign_one(&state, job_id, &opts).unwrap();

        assert_eq!(assignment.status, AssignmentStatus::Invited);
        assert_eq!(assignment.round, 1);
        assert_eq!(assignment.driver_id, driver_id);

        let job = state.jobs.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Confirmed);
        assert_eq!(job.driver_id, Some(driver_id));
        assert_eq!(state.audit_log.len(), 1);
    }

    #[test]
    fn second_manual_assign_is_a_conflict() {
        let state = state();
        let a = test_driver(4.5, 0);
        let b = test_driver(4.7, 0);
        let a_id = a.id;
        let b_id = b.id;
        state.drivers.insert(a_id, a);
        state.drivers.insert(b_id, b);
        let job_id = insert_job(&state);

        let first = AssignOptions {
            driver_id: Some(a_id),
            auto_assign: false,
            reason: None,
        };
        assign_one(&state, job_id, &first).unwrap();

        let second = AssignOptions {
            driver_id: Some(b_id),
            auto_assign: false,
            reason: None,
        };
        let err = assign_one(&state, job_id, &second).unwrap_err();
        assert_eq!(err.reason_code(), Some("already_assigned"));

        // The first binding is untouched.
        assert_eq!(state.assignments.get(&job_id).unwrap().driver_id, a_id);
    }

    #[test]
    fn auto_assign_permits_reassignment_and_bumps_round() {
        let state = state();
        let a = test_driver(4.5, 0);
        let a_id = a.id;
        state.drivers.insert(a_id, a);
        let job_id = insert_job(&state);

        let manual = AssignOptions {
            driver_id: Some(a_id),
            auto_assign: false,
            reason: None,
        };
        assign_one(&state, job_id, &manual).unwrap();

        let reassign = AssignOptions {
            driver_id: None,
            auto_assign: true,
            reason: Some("driver unresponsive".to_string()),
        };
        let assignment = assign_one(&state, job_id, &reassign).unwrap();
        assert_eq!(assignment.round, 2);
        assert_eq!(assignment.status, AssignmentStatus::Invited);
        assert!(assignment.claimed_at.is_none());
    }

    #[test]
    fn load_capped_driver_is_passed_over_despite_higher_rating() {
        let state = state();
        let lower_rated = test_driver(4.8, 0);
        let higher_rated = test_driver(4.9, 0);
        let lower_id = lower_rated.id;
        let higher_id = higher_rated.id;
        state.drivers.insert(lower_id, lower_rated);
        state.drivers.insert(higher_id, higher_rated);

        // Higher-rated driver already sits at the load cap of 3.
        for _ in 0..3 {
            assigned_job(&state, higher_id);
        }
        assigned_job(&state, lower_id);

        let job_id = insert_job(&state);
        let opts = AssignOptions {
            driver_id: None,
            auto_assign: true,
            reason: None,
        };
        let assignment = assign_one(&state, job_id, &opts).unwrap();
        assert_eq!(assignment.driver_id, lower_id);
    }

    #[test]
    fn rating_tie_breaks_on_account_age() {
        let state = state();
        let newer = test_driver(4.9, 1);
        let older = test_driver(4.9, 100);
        let older_id = older.id;
        state.drivers.insert(newer.id, newer);
        state.drivers.insert(older_id, older);

        let job_id = insert_job(&state);
        let opts = AssignOptions {
            driver_id: None,
            auto_assign: true,
            reason: None,
        };
        let assignment = assign_one(&state, job_id, &opts).unwrap();
        assert_eq!(assignment.driver_id, older_id);
    }

    #[test]
    fn auto_assign_without_candidates_is_unavailable_not_a_fault() {
        let state = state();
        let mut offline = test_driver(5.0, 0);
        offline.status = DriverStatus::Offline;
        state.drivers.insert(offline.id, offline);

        let job_id = insert_job(&state);
        let opts = AssignOptions {
            driver_id: None,
            auto_assign: true,
            reason: None,
        };
        let err = assign_one(&state, job_id, &opts).unwrap_err();
        assert!(matches!(err, AppError::NoAvailableDriver));
    }

    #[test]
    fn bulk_assign_is_partial_success() {
        let state = state();
        let driver = test_driver(4.5, 0);
        let driver_id = driver.id;
        state.drivers.insert(driver_id, driver);

        let good = insert_job(&state);
        let missing = Uuid::new_v4();

        let opts = AssignOptions {
            driver_id: Some(driver_id),
            auto_assign: false,
            reason: None,
        };
        let result = assign_jobs(&state, &[good, missing], &opts);

        assert_eq!(result.assigned.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].job_id, missing);
    }

    #[test]
    fn cancel_is_idempotent_per_item() {
        let state = state();
        let job_id = insert_job(&state);

        let first = cancel_jobs(&state, &[job_id], None);
        assert_eq!(first.cancelled.len(), 1);
        assert!(first.errors.is_empty());

        let second = cancel_jobs(&state, &[job_id], None);
        assert!(second.cancelled.is_empty());
        assert_eq!(
            second.errors[0].reason.as_deref(),
            Some("already_cancelled")
        );
    }

    #[test]
    fn cancel_aborts_the_live_assignment() {
        let state = state();
        let driver = test_driver(4.5, 0);
        let driver_id = driver.id;
        state.drivers.insert(driver_id, driver);
        let job_id = insert_job(&state);

        let opts = AssignOptions {
            driver_id: Some(driver_id),
            auto_assign: false,
            reason: None,
        };
        assign_one(&state, job_id, &opts).unwrap();
        cancel_jobs(&state, &[job_id], Some("customer withdrew".to_string()));

        assert_eq!(
            state.assignments.get(&job_id).unwrap().status,
            AssignmentStatus::Cancelled
        );
    }

    #[test]
    fn racing_assign_and_cancel_never_resurrect_a_cancelled_job() {
        for _ in 0..50 {
            let state = state();
            let driver = test_driver(4.5, 0);
            let driver_id = driver.id;
            state.drivers.insert(driver_id, driver);
            let job_id = insert_job(&state);

            let opts = AssignOptions {
                driver_id: Some(driver_id),
                auto_assign: false,
                reason: None,
            };

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    let _ = assign_one(&state, job_id, &opts);
                });
                scope.spawn(|| {
                    let _ = cancel_jobs(&state, &[job_id], None);
                });
            });

            let job_status = state.jobs.get(&job_id).unwrap().status;
            let live_offer = state
                .assignments
                .get(&job_id)
                .map(|a| !a.status.is_terminal())
                .unwrap_or(false);

            match job_status {
                JobStatus::Cancelled => {
                    assert!(!live_offer, "cancelled job left holding a live offer")
                }
                JobStatus::Confirmed => assert!(live_offer),
                other => panic!("unexpected job status {other:?}"),
            }
        }
    }

    #[test]
    fn performance_ratios_use_separate_denominators() {
        let state = state();
        let driver = test_driver(4.5, 0);
        let driver_id = driver.id;
        state.drivers.insert(driver_id, driver);

        // Four offers: two claimed, one of those completed.
        let now = Utc::now();
        for (claimed, completed) in [(false, false), (false, false), (true, false), (true, true)] {
            let job_id = Uuid::new_v4();
            state.assignments.insert(
                job_id,
                crate::models::assignment::Assignment {
                    id: Uuid::new_v4(),
                    job_id,
                    driver_id,
                    status: if completed {
                        AssignmentStatus::Completed
                    } else if claimed {
                        AssignmentStatus::Accepted
                    } else {
                        AssignmentStatus::Invited
                    },
                    round: 1,
                    created_at: now,
                    expires_at: now + Duration::minutes(30),
                    claimed_at: claimed.then_some(now),
                },
            );
        }

        let perf = driver_performance(&state, driver_id);
        assert_eq!(perf.offered, 4);
        assert_eq!(perf.claimed, 2);
        assert_eq!(perf.completed, 1);
        assert!((perf.acceptance_rate - 0.5).abs() < 1e-9);
        assert!((perf.completion_rate - 0.5).abs() < 1e-9);
    }
}
