//! Caller identity extraction.
//!
//! Credentials are checked by the authentication gateway in front of this
//! service. It forwards the identified user in `x-user-id` and, for staff,
//! `x-user-role: operator`. Requests without `x-user-id` are guests.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::UserId;
use domain::Caller;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The caller of a request, guest or identified.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Caller);

impl Identity {
    /// Returns the caller, rejecting guests with 401.
    pub fn require_user(self) -> Result<Caller, ApiError> {
        if self.0.is_authenticated() {
            Ok(self.0)
        } else {
            Err(ApiError::Unauthorized(format!(
                "missing {USER_ID_HEADER} header"
            )))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers).map(Identity)
    }
}

fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
    let Some(raw_id) = headers.get(USER_ID_HEADER) else {
        return Ok(Caller::guest());
    };

    let user_id = raw_id
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(UserId::new)
        .filter(UserId::is_valid)
        .ok_or_else(|| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER} header")))?;

    let is_operator = headers
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|role| role.trim().eq_ignore_ascii_case("operator"));

    Ok(if is_operator {
        Caller::operator(user_id)
    } else {
        Caller::customer(user_id)
    })
}
