use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Draft,
    Confirmed,
    Completed,
    Cancelled,
}

/// A bookable unit of moving work. Owned by the booking subsystem; the
/// dispatch core only mutates `status` and `driver_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub reference: String,
    pub origin: GeoPoint,
    pub origin_label: String,
    pub destination: GeoPoint,
    pub destination_label: String,
    pub scheduled_at: DateTime<Utc>,
    pub crew_size: u8,
    pub distance_miles: f64,
    pub estimated_duration_hours: f64,
    pub gross_price_pence: i64,
    pub surge_pence: i64,
    pub status: JobStatus,
    pub driver_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
