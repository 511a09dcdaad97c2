use chrono::{NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, EligibilityReason};
use crate::geo::haversine_miles;
use crate::models::driver::OnboardingStatus;
use crate::models::job::{Job, JobStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default)]
pub struct FeedFilters {
    /// Narrow the feed to jobs scheduled on this calendar day.
    pub date: Option<NaiveDate>,
    /// Override the configured search radius.
    pub radius_miles: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedJob {
    #[serde(flatten)]
    pub job: Job,
    pub distance_miles_to_origin: Option<f64>,
}

/// True when the job has an assignment row that is still live.
pub fn has_live_assignment(state: &AppState, job_id: Uuid) -> bool {
    state
        .assignments
        .get(&job_id)
        .map(|a| !a.status.is_terminal())
        .unwrap_or(false)
}

/// The driver-visible open-job feed. A compliance problem blocks the whole
/// call with a typed reason rather than quietly returning an empty list;
/// an empty list from an eligible driver is a normal result. Pure read.
pub fn available_jobs(
    state: &AppState,
    driver_id: Uuid,
    filters: &FeedFilters,
) -> Result<Vec<FeedJob>, AppError> {
    let driver = state
        .drivers
        .get(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    if driver.onboarding_status != OnboardingStatus::Approved {
        return Err(AppError::Ineligible(EligibilityReason::NotApproved));
    }

    let now = Utc::now();
    if let Some(reason) = driver.compliance.blocking_reason(now.date_naive()) {
        return Err(AppError::Ineligible(reason));
    }

    let driver_location = driver.location.clone();
    drop(driver);

    // Collected before the assignment check so no jobs iteration guard is
    // held while reading the assignment map (dispatch acquires the two in
    // the opposite order).
    let pool: Vec<Job> = state
        .jobs
        .iter()
        .filter_map(|entry| {
            let job = entry.value();
            let in_pool = job.status == JobStatus::Confirmed
                && job.driver_id.is_none()
                && job.scheduled_at >= now;

            let on_day = filters
                .date
                .map(|day| job.scheduled_at.date_naive() == day)
                .unwrap_or(true);

            if in_pool && on_day {
                Some(job.clone())
            } else {
                None
            }
        })
        .collect();

    let open_jobs = pool
        .into_iter()
        .filter(|job| !has_live_assignment(state, job.id));

    let mut feed: Vec<FeedJob> = match &driver_location {
        Some(location) => {
            let radius = filters
                .radius_miles
                .unwrap_or(state.config.search_radius_miles);

            open_jobs
                .filter_map(|job| {
                    let distance = haversine_miles(location, &job.origin);
                    if distance <= radius {
                        Some(FeedJob {
                            job,
                            distance_miles_to_origin: Some(distance),
                        })
                    } else {
                        None
                    }
                })
                .collect()
        }
        None => open_jobs
            .map(|job| FeedJob {
                job,
                distance_miles_to_origin: None,
            })
            .collect(),
    };

    match driver_location {
        Some(_) => feed.sort_by(|a, b| {
            a.distance_miles_to_origin
                .unwrap_or(f64::MAX)
                .total_cmp(&b.distance_miles_to_origin.unwrap_or(f64::MAX))
        }),
        // Newest first when we have no position to rank against.
        None => feed.sort_by(|a, b| b.job.created_at.cmp(&a.job.created_at)),
    }

    Ok(feed)
}
