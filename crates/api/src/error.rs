//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, ServiceError};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or malformed caller identity.
    #[error("{0}")]
    Unauthorized(String),
    /// The caller lacks the required role.
    #[error("{0}")]
    Forbidden(String),
    /// Cart or order service error.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// Checkout error.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Service(err) => service_error_to_response(err),
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn service_error_to_response(err: ServiceError) -> (StatusCode, String) {
    match &err {
        ServiceError::InvalidInput(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string()),
        ServiceError::Store(store_err) => store_error_to_response(store_err),
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    match &err {
        CheckoutError::EmptyCart { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        CheckoutError::InsufficientStock { .. } => (StatusCode::CONFLICT, err.to_string()),
        CheckoutError::ProductNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CheckoutError::CartChanged { .. } => (StatusCode::CONFLICT, err.to_string()),
        CheckoutError::DeadlineExceeded(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        CheckoutError::Store(store_err) => store_error_to_response(store_err),
        CheckoutError::Domain(_) => (StatusCode::BAD_REQUEST, err.to_string()),
    }
}

fn store_error_to_response(err: &StoreError) -> (StatusCode, String) {
    match err {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        StoreError::Conflict(_) | StoreError::UniqueViolation { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        _ => internal(err),
    }
}

fn internal(err: &dyn std::error::Error) -> (StatusCode, String) {
    tracing::error!(error = %err, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal server error".to_string(),
    )
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Service(ServiceError::InvalidInput(err))
    }
}
