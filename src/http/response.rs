//! Response envelopes and error mapping.
//!
//! # Responsibilities
//! - Shape every API reply as `{success, error?}`
//! - Map registry error kinds to HTTP status codes
//!
//! # Design Decisions
//! - The error `kind` is the taxonomy name callers branch on; the message is for humans
//! - Storage failures are 502: the registry is healthy, its backing store is not

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::RegistryError;
use crate::registry::OperationError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Registry(RegistryError),
    Operation(OperationError),
    BadRequest(String),
    NotFound(String),
    Unauthorized,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Registry(e) => match e {
                RegistryError::Validation(_) | RegistryError::Schema(_) => StatusCode::BAD_REQUEST,
                RegistryError::Compile { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                RegistryError::VersionConflict { .. } => StatusCode::CONFLICT,
                RegistryError::Storage(_) => StatusCode::BAD_GATEWAY,
                RegistryError::Interrupted => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Operation(OperationError::Unknown(_)) => StatusCode::NOT_FOUND,
            ApiError::Operation(OperationError::InvalidInput { .. }) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    fn body(&self) -> ErrorBody {
        let (kind, message) = match self {
            ApiError::Registry(e) => (e.kind(), e.to_string()),
            ApiError::Operation(e @ OperationError::Unknown(_)) => ("UnknownOperation", e.to_string()),
            ApiError::Operation(e) => ("InvalidInput", e.to_string()),
            ApiError::BadRequest(message) => ("InvalidInput", message.clone()),
            ApiError::NotFound(message) => ("NotFound", message.clone()),
            ApiError::Unauthorized => ("Unauthorized", "missing or invalid bearer token".to_string()),
        };
        ErrorBody { kind, message }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        ApiError::Registry(e)
    }
}

impl From<OperationError> for ApiError {
    fn from(e: OperationError) -> Self {
        ApiError::Operation(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiResponse {
            success: false,
            error: Some(self.body()),
        };
        (status, Json(body)).into_response()
    }
}
