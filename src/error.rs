use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Why a driver's job feed is blocked outright instead of filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityReason {
    NotApproved,
    ExpiredLicense,
    ExpiredInsurance,
    ExpiredDocuments,
}

impl EligibilityReason {
    pub fn code(&self) -> &'static str {
        match self {
            EligibilityReason::NotApproved => "not_approved",
            EligibilityReason::ExpiredLicense => "expired_license",
            EligibilityReason::ExpiredInsurance => "expired_insurance",
            EligibilityReason::ExpiredDocuments => "expired_documents",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {message}")]
    Conflict {
        code: &'static str,
        message: String,
    },

    #[error("driver is not eligible: {}", .0.code())]
    Ineligible(EligibilityReason),

    #[error("no available driver")]
    NoAvailableDriver,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn already_assigned(job_id: impl std::fmt::Display) -> Self {
        AppError::Conflict {
            code: "already_assigned",
            message: format!("job {job_id} already has a live assignment"),
        }
    }

    pub fn already_cancelled(job_id: impl std::fmt::Display) -> Self {
        AppError::Conflict {
            code: "already_cancelled",
            message: format!("job {job_id} is already cancelled"),
        }
    }

    /// Machine-readable code carried alongside the human message, where one
    /// exists. Bulk endpoints surface this per item.
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            AppError::Conflict { code, .. } => Some(code),
            AppError::Ineligible(reason) => Some(reason.code()),
            AppError::NoAvailableDriver => Some("no_available_driver"),
            AppError::Forbidden(_) => Some("forbidden"),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Ineligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NoAvailableDriver => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = json!({ "error": self.to_string() });
        if let Some(code) = self.reason_code() {
            body["reason"] = json!(code);
        }

        (status, Json(body)).into_response()
    }
}
