//! Common API response types

use actix_web::{http::StatusCode, HttpResponse};
use serde::Serialize;

use crate::models::FederationError;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// List response
#[derive(Debug, Serialize)]
pub struct ListResponse<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T: Serialize> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

/// HTTP status a federation error is answered with
pub fn status_for(error: &FederationError) -> StatusCode {
    match error {
        FederationError::Disabled(_) => StatusCode::FORBIDDEN,
        FederationError::Unauthorized(_) => StatusCode::FORBIDDEN,
        FederationError::ProposalsDisabled => StatusCode::METHOD_NOT_ALLOWED,
        FederationError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        FederationError::UnknownKind(_) => StatusCode::BAD_REQUEST,
        FederationError::NotFound { .. } => StatusCode::NOT_FOUND,
        FederationError::SerializationError(_) => StatusCode::BAD_REQUEST,
        FederationError::NetworkError(_) => StatusCode::BAD_GATEWAY,
        FederationError::DatabaseError(_)
        | FederationError::ConfigError(_)
        | FederationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert FederationError to HTTP response
impl From<FederationError> for HttpResponse {
    fn from(error: FederationError) -> Self {
        HttpResponse::build(status_for(&error)).json(ApiResponse::<()>::error(error.to_string()))
    }
}
