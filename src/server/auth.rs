//! Caller identity extraction.
//!
//! The relay does not run its own auth provider. It trusts whatever sits in
//! front of it to terminate authentication and only needs a stable owner
//! identifier to scope execution lookups: either `Authorization: Bearer
//! <owner>` or an `X-Relay-Owner` header. Requests carrying neither are
//! rejected with 401 before any stream state is touched.

use axum::extract::FromRequestParts;
use axum::http::{StatusCode, header, request::Parts};

pub(crate) const OWNER_HEADER: &str = "x-relay-owner";

/// Owner identifier of the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(owner: impl Into<String>) -> Self {
        Self(owner.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        let custom = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok());

        match bearer.or(custom).map(str::trim).filter(|o| !o.is_empty()) {
            Some(owner) => Ok(Self(owner.to_string())),
            None => Err((StatusCode::UNAUTHORIZED, "missing caller identity")),
        }
    }
}
