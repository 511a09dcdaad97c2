use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sealed at creation, exactly one per assignment. All amounts are integer
/// pence; tips added after settlement never reopen this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsRecord {
    pub assignment_id: Uuid,
    pub driver_id: Uuid,
    pub job_id: Uuid,
    pub base_pence: i64,
    pub surge_pence: i64,
    pub tip_pence: i64,
    pub fee_pence: i64,
    pub net_pence: i64,
    pub currency: String,
    pub calculated_at: DateTime<Utc>,
    pub paid_out: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TipStatus {
    Pending,
    Confirmed,
    Reconciled,
    Rejected,
}

impl TipStatus {
    /// Only settled-quality tips count towards payout.
    pub fn counts_towards_payout(&self) -> bool {
        matches!(self, TipStatus::Confirmed | TipStatus::Reconciled)
    }
}

/// Mutable tip ledger entry, read (not consumed) at settlement time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tip {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub amount_pence: i64,
    pub status: TipStatus,
    pub created_at: DateTime<Utc>,
}
