//! API error taxonomy.
//!
//! Precondition failures (claim races, sends against a non-active handoff,
//! unauthorized actors) map to 4xx responses with a machine-readable code;
//! nothing here is fatal to the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use switchboard_protocol::ErrorBody;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("missing or invalid credential")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),

    /// Claim attempted on a handoff that is no longer `pending`
    #[error("handoff is not available")]
    NotAvailable,

    /// Send or resolve attempted on a handoff not in the required state
    #[error("handoff is not active")]
    NotActive,

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound => "not_found",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotAvailable => "not_available",
            ApiError::NotActive => "not_active",
            ApiError::Invalid(_) => "invalid_request",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotAvailable | ApiError::NotActive => StatusCode::CONFLICT,
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref e) = self {
            error!(
                component = "api",
                event = "api.internal_error",
                error = %e,
                "Request failed"
            );
        }

        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.into())
    }
}

impl From<crate::lifecycle::LifecycleError> for ApiError {
    fn from(e: crate::lifecycle::LifecycleError) -> Self {
        use crate::lifecycle::LifecycleError;
        match e {
            LifecycleError::NotFound => ApiError::NotFound,
            LifecycleError::NotAvailable => ApiError::NotAvailable,
            LifecycleError::NotActive => ApiError::NotActive,
            LifecycleError::Forbidden(reason) => ApiError::Forbidden(reason),
            LifecycleError::Store(e) => ApiError::Internal(e.into()),
        }
    }
}
