//! Error types for the federation engine

use thiserror::Error;

/// Federation errors
#[derive(Debug, Error)]
pub enum FederationError {
    #[error("Federation is disabled: {0}")]
    Disabled(String),

    #[error("Federation proposals are not allowed")]
    ProposalsDisabled,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown federation request: {0}")]
    UnknownKind(String),

    #[error("Not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FederationError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        FederationError::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        FederationError::MalformedPayload(reason.into())
    }

    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            FederationError::Disabled(_) => "disabled",
            FederationError::ProposalsDisabled => "proposals_disabled",
            FederationError::Unauthorized(_) => "unauthorized",
            FederationError::MalformedPayload(_) => "malformed",
            FederationError::UnknownKind(_) => "unknown_kind",
            FederationError::NotFound { .. } => "not_found",
            FederationError::DatabaseError(_) => "database",
            FederationError::SerializationError(_) => "serialization",
            FederationError::ConfigError(_) => "config",
            FederationError::NetworkError(_) => "network",
            FederationError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for FederationError {
    fn from(err: std::io::Error) -> Self {
        FederationError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for FederationError {
    fn from(err: serde_json::Error) -> Self {
        FederationError::SerializationError(err.to_string())
    }
}

impl From<config::ConfigError> for FederationError {
    fn from(err: config::ConfigError) -> Self {
        FederationError::ConfigError(err.to_string())
    }
}

impl From<rocksdb::Error> for FederationError {
    fn from(err: rocksdb::Error) -> Self {
        FederationError::DatabaseError(err.to_string())
    }
}

/// Result type for federation operations
pub type FederationResult<T> = Result<T, FederationError>;
