//! HTTP handlers.

pub mod admin;
pub mod cart;
pub mod orders;
pub mod system;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses an identifier from a path segment.
fn parse_id<T>(kind: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {kind} id: {e}")))
}
