use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EligibilityReason;
use crate::models::job::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriverStatus {
    Online,
    Break,
    Offline,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OnboardingStatus {
    Pending,
    Approved,
    Rejected,
}

/// Compliance document expiry dates. A missing vehicle check is allowed
/// (not every fleet requires one); a present-but-expired one blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceDocs {
    pub license_expires: NaiveDate,
    pub insurance_expires: NaiveDate,
    pub right_to_work_expires: NaiveDate,
    pub vehicle_check_expires: Option<NaiveDate>,
    pub documents_complete: bool,
}

impl ComplianceDocs {
    /// First blocking reason as of `today`, checked in the order the feed
    /// reports them. License and insurance get their own codes; everything
    /// else collapses into `expired_documents`.
    pub fn blocking_reason(&self, today: NaiveDate) -> Option<EligibilityReason> {
        if self.license_expires < today {
            return Some(EligibilityReason::ExpiredLicense);
        }
        if self.insurance_expires < today {
            return Some(EligibilityReason::ExpiredInsurance);
        }
        if self.right_to_work_expires < today {
            return Some(EligibilityReason::ExpiredDocuments);
        }
        if let Some(expires) = self.vehicle_check_expires {
            if expires < today {
                return Some(EligibilityReason::ExpiredDocuments);
            }
        }
        if !self.documents_complete {
            return Some(EligibilityReason::ExpiredDocuments);
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub status: DriverStatus,
    pub onboarding_status: OnboardingStatus,
    pub compliance: ComplianceDocs,
    pub rating: f64,
    pub points: u32,
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
