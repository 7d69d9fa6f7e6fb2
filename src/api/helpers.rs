//! Response builders for API Gateway proxy responses.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::error;

use crate::errors::{AdminConfigError, StoreError};

// ============================================================================
// Response Builders
// ============================================================================

/// Returns a 200 OK response with `body` serialized as JSON.
#[must_use]
pub fn ok_json<T: Serialize>(body: &T) -> Value {
    match serde_json::to_string(body) {
        Ok(body) => json!({
            "statusCode": 200,
            "headers": { "Content-Type": "application/json" },
            "body": body
        }),
        Err(e) => {
            error!("Failed to serialize response body: {}", e);
            err_response(500, "Failed to serialize response")
        }
    }
}

/// Returns a 200 OK response with an empty body.
#[must_use]
pub fn ok_empty() -> Value {
    json!({ "statusCode": 200, "body": "" })
}

/// Returns a 204 No Content response.
#[must_use]
pub fn no_content() -> Value {
    json!({ "statusCode": 204, "body": "" })
}

/// Returns an error response with the given status code and message.
#[must_use]
pub fn err_response(status_code: u16, message: &str) -> Value {
    json!({
        "statusCode": status_code,
        "headers": { "Content-Type": "application/json" },
        "body": json!({ "error": message }).to_string()
    })
}

/// HTTP status for a repository error.
#[must_use]
pub fn status_for(error: &AdminConfigError) -> u16 {
    match error {
        AdminConfigError::NotFound(_) => 404,
        AdminConfigError::InvalidRequest(_)
        | AdminConfigError::InvalidUserId(_)
        | AdminConfigError::InvalidConfigId(_) => 400,
        AdminConfigError::Storage(StoreError::EntityNotFound { .. }) => 404,
        AdminConfigError::Storage(StoreError::EntityAlreadyExists { .. }) => 409,
        // A stored value that no longer parses is a data problem, not a caller problem.
        AdminConfigError::InvalidFlagValue(_) | AdminConfigError::Storage(_) => 500,
    }
}

/// Maps a repository error onto an error response, logging server-side failures.
#[must_use]
pub fn error_response(error: &AdminConfigError) -> Value {
    let status = status_for(error);
    if status >= 500 {
        error!("Admin configuration request failed: {}", error);
    }
    err_response(status, &error.to_string())
}
