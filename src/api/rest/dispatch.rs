use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::dispatch::{
    AssignOptions, BulkAssignResult, BulkCancelResult, assign_jobs, cancel_jobs,
};
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::state::{AppState, PricingSettings};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dispatch/assign", post(post_assign))
        .route("/dispatch/cancel", post(post_cancel))
        .route("/assignments", get(list_assignments))
        .route("/pricing", get(get_pricing).patch(patch_pricing))
}

#[derive(Deserialize)]
pub struct BulkAssignRequest {
    pub job_ids: Vec<Uuid>,
    pub driver_id: Option<Uuid>,
    #[serde(default)]
    pub auto_assign: bool,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct BulkCancelRequest {
    pub job_ids: Vec<Uuid>,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdatePricingRequest {
    pub is_active: bool,
    pub driver_rate_multiplier: f64,
}

async fn post_assign(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BulkAssignRequest>,
) -> Result<Json<BulkAssignResult>, AppError> {
    if payload.job_ids.is_empty() {
        return Err(AppError::BadRequest("job_ids cannot be empty".to_string()));
    }

    let opts = AssignOptions {
        driver_id: payload.driver_id,
        auto_assign: payload.auto_assign,
        reason: payload.reason,
    };

    Ok(Json(assign_jobs(&state, &payload.job_ids, &opts)))
}

async fn post_cancel(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BulkCancelRequest>,
) -> Result<Json<BulkCancelResult>, AppError> {
    if payload.job_ids.is_empty() {
        return Err(AppError::BadRequest("job_ids cannot be empty".to_string()));
    }

    Ok(Json(cancel_jobs(&state, &payload.job_ids, payload.reason)))
}

async fn list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<Assignment>> {
    let assignments = state
        .assignments
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    Json(assignments)
}

async fn get_pricing(State(state): State<Arc<AppState>>) -> Json<PricingSettings> {
    Json(state.pricing.read().await.clone())
}

async fn patch_pricing(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdatePricingRequest>,
) -> Result<Json<PricingSettings>, AppError> {
    if payload.driver_rate_multiplier <= 0.0 {
        return Err(AppError::BadRequest(
            "driver_rate_multiplier must be positive".to_string(),
        ));
    }

    let mut pricing = state.pricing.write().await;
    pricing.is_active = payload.is_active;
    pricing.driver_rate_multiplier = payload.driver_rate_multiplier;

    Ok(Json(pricing.clone()))
}
