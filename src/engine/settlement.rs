use chrono::Utc;
use dashmap::mapref::entry::Entry;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::fare::{self, FareRates};
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::earnings::EarningsRecord;
use crate::models::job::JobStatus;
use crate::notify::{self, NotificationEvent};
use crate::state::AppState;

fn confirmed_tips_pence(state: &AppState, assignment_id: Uuid) -> i64 {
    state
        .tips
        .iter()
        .filter(|entry| {
            let tip = entry.value();
            tip.assignment_id == assignment_id && tip.status.counts_towards_payout()
        })
        .map(|entry| entry.value().amount_pence)
        .sum()
}

/// Settles a completed assignment exactly once. The earnings map is keyed
/// by assignment id and the write goes through its entry lock, so of two
/// racing completion calls one seals the record and the other reads it
/// back as a no-op with the identical net amount.
pub async fn settle(state: &AppState, assignment: &Assignment) -> Result<EarningsRecord, AppError> {
    // Fast path before any fare work: a sealed record is final.
    if let Some(existing) = state.earnings.get(&assignment.id) {
        state
            .metrics
            .settlements_total
            .with_label_values(&["duplicate"])
            .inc();
        return Ok(existing.clone());
    }

    let (distance_miles, duration_hours, surge_pence) = {
        let job = state
            .jobs
            .get(&assignment.job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", assignment.job_id)))?;
        (
            job.distance_miles,
            job.estimated_duration_hours,
            job.surge_pence,
        )
    };

    let multiplier = {
        let pricing = state.pricing.read().await;
        if pricing.is_active {
            pricing.driver_rate_multiplier
        } else {
            1.0
        }
    };

    let tip_pence = confirmed_tips_pence(state, assignment.id);
    let rates = FareRates::from_config(&state.config);

    let record = match state.earnings.entry(assignment.id) {
        // Lost the race: the winner's record is the answer.
        Entry::Occupied(occupied) => {
            state
                .metrics
                .settlements_total
                .with_label_values(&["duplicate"])
                .inc();
            return Ok(occupied.get().clone());
        }
        Entry::Vacant(vacant) => {
            let breakdown = fare::calculate(
                &rates,
                distance_miles,
                duration_hours,
                surge_pence,
                tip_pence,
                multiplier,
            );
            vacant
                .insert(EarningsRecord {
                    assignment_id: assignment.id,
                    driver_id: assignment.driver_id,
                    job_id: assignment.job_id,
                    base_pence: breakdown.base_pence,
                    surge_pence: breakdown.surge_pence,
                    tip_pence: breakdown.tip_pence,
                    fee_pence: breakdown.fee_pence,
                    net_pence: breakdown.net_pence,
                    currency: "GBP".to_string(),
                    calculated_at: Utc::now(),
                    paid_out: false,
                })
                .clone()
        }
    };

    // The record is sealed; nothing past this point may fail the call.
    if let Some(mut job) = state.jobs.get_mut(&assignment.job_id) {
        job.status = JobStatus::Completed;
    } else {
        warn!(job_id = %assignment.job_id, "settled assignment for a missing job");
    }

    notify::emit(
        &state.notifications_tx,
        NotificationEvent::JobCompleted {
            job_id: assignment.job_id,
            assignment_id: assignment.id,
            driver_id: assignment.driver_id,
            net_pence: record.net_pence,
        },
    );

    state
        .metrics
        .settlements_total
        .with_label_values(&["success"])
        .inc();

    info!(
        assignment_id = %assignment.id,
        job_id = %assignment.job_id,
        net_pence = record.net_pence,
        "assignment settled"
    );

    Ok(record)
}
