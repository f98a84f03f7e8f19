//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fulfillment::FulfillmentError;
use serde::Serialize;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The request could not be decoded or lacks a required field.
    BadRequest(String),
    /// The engine rejected or failed the operation.
    Fulfillment(FulfillmentError),
}

impl ApiError {
    /// Error for a request field that was absent or null.
    pub fn missing(field: &'static str) -> Self {
        ApiError::BadRequest(format!("missing required field '{field}'"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Fulfillment(err) => fulfillment_status(err),
        }
    }
}

fn fulfillment_status(err: &FulfillmentError) -> StatusCode {
    match err {
        FulfillmentError::Validation(_) | FulfillmentError::InsufficientStock { .. } => {
            StatusCode::BAD_REQUEST
        }
        FulfillmentError::NotFound { .. } => StatusCode::NOT_FOUND,
        FulfillmentError::StoreTimeout { .. } | FulfillmentError::Conflict { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        FulfillmentError::StoreWrite(_)
        | FulfillmentError::CompensationFailed { .. }
        | FulfillmentError::AuditWrite { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::BadRequest(message) => ErrorDetail {
                kind: "validation",
                message,
                retryable: false,
            },
            ApiError::Fulfillment(err) => {
                if status.is_server_error() {
                    tracing::error!(kind = err.kind(), error = %err, "request failed");
                } else {
                    tracing::debug!(kind = err.kind(), error = %err, "request rejected");
                }
                ErrorDetail {
                    kind: err.kind(),
                    message: err.to_string(),
                    retryable: err.is_retryable(),
                }
            }
        };

        metrics::counter!(
            "http_errors_total",
            "kind" => detail.kind,
            "status" => status.as_u16().to_string()
        )
        .increment(1);

        (status, axum::Json(ErrorBody { error: detail })).into_response()
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Unwraps a required request field.
pub fn required<T>(value: Option<T>, field: &'static str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::missing(field))
}
