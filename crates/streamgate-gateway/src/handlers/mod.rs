//! HTTP request handlers.
//!
//! This module contains all the endpoint handlers for the gateway API.

pub mod health;
pub mod internal;
pub mod nodes;
pub mod sessions;
pub mod sse;

#[cfg(test)]
pub(crate) mod testing;

use streamgate_core::SessionId;

use crate::error::ApiError;

/// Parse a session ID from a string.
fn parse_session_id(s: &str) -> Result<SessionId, ApiError> {
    s.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid session ID: {s}")))
}
