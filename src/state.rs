use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use crate::config::Config;
use crate::models::assignment::Assignment;
use crate::models::driver::Driver;
use crate::models::earnings::{EarningsRecord, Tip};
use crate::models::event::JobEvent;
use crate::models::job::Job;
use crate::notify::NotificationEvent;
use crate::observability::metrics::Metrics;

/// Rate knob supplied by the pricing subsystem. When inactive, settlement
/// treats the multiplier as 1.0.
#[derive(Debug, Clone, Serialize)]
pub struct PricingSettings {
    pub is_active: bool,
    pub driver_rate_multiplier: f64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            is_active: true,
            driver_rate_multiplier: 1.0,
        }
    }
}

/// Before/after snapshot written on every dispatch-side job mutation.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub action: &'static str,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

pub struct AppState {
    pub config: Config,
    pub jobs: DashMap<Uuid, Job>,
    pub drivers: DashMap<Uuid, Driver>,
    /// Keyed by job id: the map key is the uniqueness constraint that
    /// guarantees at most one live assignment per job.
    pub assignments: DashMap<Uuid, Assignment>,
    pub events: DashMap<Uuid, JobEvent>,
    /// Keyed by assignment id: entry locking here is what makes settlement
    /// exactly-once under racing completion calls.
    pub earnings: DashMap<Uuid, EarningsRecord>,
    pub tips: DashMap<Uuid, Tip>,
    pub audit_log: DashMap<Uuid, AuditRecord>,
    pub pricing: RwLock<PricingSettings>,
    pub notifications_tx: broadcast::Sender<NotificationEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (notifications_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        Self {
            config,
            jobs: DashMap::new(),
            drivers: DashMap::new(),
            assignments: DashMap::new(),
            events: DashMap::new(),
            earnings: DashMap::new(),
            tips: DashMap::new(),
            audit_log: DashMap::new(),
            pricing: RwLock::new(PricingSettings::default()),
            notifications_tx,
            metrics: Metrics::new(),
        }
    }

    pub fn record_audit(
        &self,
        job_id: Uuid,
        action: &'static str,
        before: serde_json::Value,
        after: serde_json::Value,
        reason: Option<String>,
    ) {
        let record = AuditRecord {
            id: Uuid::new_v4(),
            job_id,
            action,
            before,
            after,
            reason,
            recorded_at: Utc::now(),
        };
        self.audit_log.insert(record.id, record);
    }
}
