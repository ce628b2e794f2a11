//! Error types for vsphere-collector
//!
//! This module defines the error types used throughout the application.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Resource filter definition errors
///
/// Each variant carries the position of the offending entry in
/// `resource_filters` so the warning can point at it.
#[derive(Error, Debug)]
pub enum FilterError {
    /// A required key is absent from the definition
    #[error("Resource filter #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    /// The `resource` value is not a collectable resource type
    #[error("Resource filter #{index} has unsupported resource '{resource}'")]
    UnsupportedResource { index: usize, resource: String },

    /// The `property` value cannot be matched for this resource type
    #[error("Resource filter #{index} has unsupported property '{property}' for resource '{resource}'")]
    UnsupportedProperty {
        index: usize,
        resource: String,
        property: String,
    },

    /// The `type` value is not include/exclude (or a legacy alias)
    #[error("Resource filter #{index} has unsupported type '{filter_type}'")]
    UnsupportedType { index: usize, filter_type: String },

    /// A pattern failed to compile
    #[error("Resource filter #{index} has invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Another filter already exists for the same resource, property and type
    #[error("Resource filter #{index} duplicates an earlier filter for ({resource}, {property}, {filter_type})")]
    Duplicate {
        index: usize,
        resource: String,
        property: String,
        filter_type: String,
    },
}

/// Tag resolution errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TagError {
    /// The parent chain of `start` revisits `repeated`
    #[error("Parent chain of '{start}' loops back to '{repeated}'")]
    ParentCycle { start: String, repeated: String },
}

/// Connection errors raised while talking to the inventory gateway
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to build the HTTP client
    #[error("Failed to initialize HTTP client: {0}")]
    HttpClientInit(#[source] reqwest::Error),

    /// The request could not be sent
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[source] reqwest::Error),

    /// The response body could not be read
    #[error("Failed to read HTTP response: {0}")]
    HttpResponse(#[source] reqwest::Error),

    /// Non-success status returned by the gateway
    #[error("HTTP error status: {0}")]
    HttpStatus(u16),

    /// Response body did not have the expected shape
    #[error("Failed to decode gateway response: {0}")]
    Decode(String),

    /// Request timed out
    /// The value is the configured timeout in milliseconds, if known.
    #[error("Request timed out{}", .0.map(|ms| format!(" after {}ms", ms)).unwrap_or_default())]
    Timeout(Option<u64>),

    /// TCP connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl ConnectionError {
    /// HTTP status code, if the failure came from the gateway itself
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ConnectionError::HttpStatus(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ConnectionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ConnectionError::Timeout(None)
        } else if err.is_connect() {
            ConnectionError::ConnectionFailed(err.to_string())
        } else if err.is_request() {
            ConnectionError::HttpRequest(err)
        } else {
            ConnectionError::HttpResponse(err)
        }
    }
}

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Gateway communication error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, public_message, log_message) = match self {
            AppError::Connection(e) => (StatusCode::BAD_GATEWAY, "Upstream error", e.to_string()),
        };

        tracing::error!(status = %status, error = %log_message, "Request failed");

        (status, public_message).into_response()
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for gateway calls
pub type ConnectionResult<T> = Result<T, ConnectionError>;
