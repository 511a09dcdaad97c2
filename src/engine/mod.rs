pub mod dispatch;
pub mod eligibility;
pub mod fare;
pub mod progress;
pub mod settlement;
