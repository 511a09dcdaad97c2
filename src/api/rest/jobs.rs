use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::progress::{StepOutcome, record_step};
use crate::error::AppError;
use crate::geo::haversine_miles;
use crate::models::earnings::{EarningsRecord, Tip, TipStatus};
use crate::models::event::{JobEvent, Milestone};
use crate::models::job::{GeoPoint, Job, JobStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/events", get(list_job_events))
        .route("/jobs/:id/steps", post(post_step))
        .route("/earnings/:assignment_id", get(get_earnings))
        .route("/tips", post(create_tip))
}

/// Assumed average speed when a booking arrives without a duration
/// estimate.
const FALLBACK_SPEED_MPH: f64 = 30.0;

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub reference: Option<String>,
    pub origin: GeoPoint,
    pub origin_label: String,
    pub destination: GeoPoint,
    pub destination_label: String,
    pub scheduled_at: DateTime<Utc>,
    pub crew_size: u8,
    pub gross_price_pence: i64,
    #[serde(default)]
    pub surge_pence: i64,
    pub distance_miles: Option<f64>,
    pub estimated_duration_hours: Option<f64>,
    pub status: Option<JobStatus>,
}

#[derive(Deserialize)]
pub struct RecordStepRequest {
    pub driver_id: Uuid,
    pub step: String,
    pub note: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
pub struct CreateTipRequest {
    pub assignment_id: Uuid,
    pub amount_pence: i64,
    pub status: TipStatus,
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateJobRequest>,
) -> Result<Json<Job>, AppError> {
    if payload.crew_size == 0 {
        return Err(AppError::BadRequest("crew_size must be > 0".to_string()));
    }
    if payload.gross_price_pence < 0 {
        return Err(AppError::BadRequest(
            "gross_price_pence cannot be negative".to_string(),
        ));
    }
    if payload.surge_pence < 0 {
        return Err(AppError::BadRequest(
            "surge_pence cannot be negative".to_string(),
        ));
    }

    let id = Uuid::new_v4();
    let distance_miles = payload
        .distance_miles
        .unwrap_or_else(|| haversine_miles(&payload.origin, &payload.destination));
    let estimated_duration_hours = payload
        .estimated_duration_hours
        .unwrap_or(distance_miles / FALLBACK_SPEED_MPH);

    let job = Job {
        id,
        reference: payload
            .reference
            .unwrap_or_else(|| format!("MV-{}", &id.simple().to_string()[..8].to_uppercase())),
        origin: payload.origin,
        origin_label: payload.origin_label,
        destination: payload.destination,
        destination_label: payload.destination_label,
        scheduled_at: payload.scheduled_at,
        crew_size: payload.crew_size,
        distance_miles,
        estimated_duration_hours,
        gross_price_pence: payload.gross_price_pence,
        surge_pence: payload.surge_pence,
        status: payload.status.unwrap_or(JobStatus::Confirmed),
        driver_id: None,
        created_at: Utc::now(),
    };

    state.jobs.insert(job.id, job.clone());
    Ok(Json(job))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, AppError> {
    let job = state
        .jobs
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("job {id} not found")))?;

    Ok(Json(job.value().clone()))
}

async fn list_job_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<JobEvent>>, AppError> {
    if !state.jobs.contains_key(&id) {
        return Err(AppError::NotFound(format!("job {id} not found")));
    }

    let mut events: Vec<JobEvent> = state
        .events
        .iter()
        .filter(|entry| entry.value().job_id == id)
        .map(|entry| entry.value().clone())
        .collect();
    events.sort_by_key(|event| event.recorded_at);

    Ok(Json(events))
}

async fn post_step(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordStepRequest>,
) -> Result<Json<StepOutcome>, AppError> {
    if payload.step.trim().is_empty() {
        return Err(AppError::BadRequest("step cannot be empty".to_string()));
    }

    let step: Milestone = payload.step.into();
    let outcome = record_step(
        &state,
        id,
        payload.driver_id,
        step,
        payload.note,
        payload.payload,
    )
    .await?;

    Ok(Json(outcome))
}

async fn get_earnings(
    State(state): State<Arc<AppState>>,
    Path(assignment_id): Path<Uuid>,
) -> Result<Json<EarningsRecord>, AppError> {
    let record = state.earnings.get(&assignment_id).ok_or_else(|| {
        AppError::NotFound(format!("no earnings for assignment {assignment_id}"))
    })?;

    Ok(Json(record.value().clone()))
}

async fn create_tip(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTipRequest>,
) -> Result<Json<Tip>, AppError> {
    if payload.amount_pence <= 0 {
        return Err(AppError::BadRequest(
            "amount_pence must be positive".to_string(),
        ));
    }

    let tip = Tip {
        id: Uuid::new_v4(),
        assignment_id: payload.assignment_id,
        amount_pence: payload.amount_pence,
        status: payload.status,
        created_at: Utc::now(),
    };

    state.tips.insert(tip.id, tip.clone());
    Ok(Json(tip))
}
