//! Caller identity extractors.
//!
//! Authentication happens upstream. The gateway forwards the caller as two
//! headers:
//! - `x-user-id`: the user's UUID
//! - `x-user-role`: `customer` (default) or `admin`

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use domain::{Identity, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Extractor that requires an authenticated caller.
///
/// Rejects with 401 when the identity headers are missing or malformed.
pub struct RequireUser(pub Identity);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_parts(parts).map(Self)
    }
}

/// Extractor that requires an administrator.
///
/// Rejects with 401 without an identity and 403 for non-admin callers.
pub struct RequireAdmin(pub Identity);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = identity_from_parts(parts)?;
        if !identity.is_admin() {
            return Err(ApiError::Forbidden(
                "administrator role required".to_string(),
            ));
        }
        Ok(Self(identity))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::Unauthorized(format!("{name} is not valid text")))
        })
        .transpose()
}

fn identity_from_parts(parts: &Parts) -> Result<Identity, ApiError> {
    let user_id: UserId = header(parts, USER_ID_HEADER)?
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?
        .trim()
        .parse()
        .map_err(|e| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER}: {e}")))?;

    let role = match header(parts, USER_ROLE_HEADER)?.map(str::trim) {
        None | Some("") => Role::Customer,
        Some(role) if role.eq_ignore_ascii_case("customer") => Role::Customer,
        Some(role) if role.eq_ignore_ascii_case("admin") => Role::Admin,
        Some(other) => {
            return Err(ApiError::Unauthorized(format!(
                "unknown {USER_ROLE_HEADER}: {other}"
            )));
        }
    };

    Ok(Identity { user_id, role })
}
