//! Error types for sensorgate
//!
//! This module defines the error types used throughout the sensorgate system.
//! The variants mirror the HTTP status classes the northbound layer answers
//! with, so a handler can propagate errors with `?` and let the binding layer
//! translate them.

use std::io;

use thiserror::Error;

/// sensorgate error types
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed request data, including malformed composite ids
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Provider, resource or historical value is absent
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Mutation refused because of the current entity state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Required-field validation error on a create or update payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// History backend error
    #[error("History error: {0}")]
    History(String),

    /// Data integrity fault, e.g. a stored location that fails to parse
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl GatewayError {
    /// A `NotFound` without further context, for lookups where the id alone
    /// already says everything
    pub fn not_found() -> Self {
        GatewayError::NotFound("entity not found".to_string())
    }

    /// A `BadRequest` for a malformed composite id
    pub fn invalid_id() -> Self {
        GatewayError::BadRequest("Invalid id".to_string())
    }
}

/// Result type for sensorgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}
