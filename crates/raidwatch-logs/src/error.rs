//! Error types for the log service client.

use thiserror::Error;

/// Errors that can occur when talking to the log service.
#[derive(Debug, Error)]
pub enum LogsError {
    /// OAuth token exchange failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success HTTP status from the GraphQL endpoint.
    #[error("graphql request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// Application-level error embedded in a GraphQL response.
    #[error("graphql error: {0}")]
    GraphQL(String),

    /// The response carried no usable data payload.
    #[error("graphql: empty data")]
    EmptyData,
}
