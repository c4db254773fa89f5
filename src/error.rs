// Error types shared across the planner

use serde::{Deserialize, Serialize};
use thiserror::Error;

// Failures coming back from an upstream provider. These never leave the gateway:
// they are folded into an ErrorRecord and attached to the plan component.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code} - {message}")]
    ApiResponse { status_code: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

// Timeouts are mapped by the HTTP upstream, which knows its configured limit
impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

/// Structured failure attached to a plan component or returned from a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error: String,
    pub details: String,
}

impl ErrorRecord {
    pub fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Invalid input for field '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Plan with ID {id} not found")]
    PlanNotFound { id: String },

    #[error("Plan creation cancelled")]
    Cancelled,
}

impl PlannerError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlannerError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error for '{key}': {reason}")]
    Invalid { key: String, reason: String },

    #[error("Initialization error: {0}")]
    Init(String),
}
