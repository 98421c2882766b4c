//! Resolved-identity extractor.
//!
//! Authentication happens upstream; by the time a request reaches this
//! service the session layer has resolved either a customer id or a
//! guest session id and forwards it in a header. The core never
//! authenticates, it only scopes carts and orders to that identity.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::CustomerId;
use domain::CartOwner;
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying a signed-in customer's id (a UUID).
pub const CUSTOMER_HEADER: &str = "x-customer-id";

/// Header carrying an anonymous session id.
pub const SESSION_HEADER: &str = "x-session-id";

/// The identity a request acts as.
#[derive(Debug, Clone)]
pub struct Identity(pub CartOwner);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(value) = parts.headers.get(CUSTOMER_HEADER) {
            let raw = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("invalid customer id header".to_string()))?;
            let uuid = Uuid::parse_str(raw)
                .map_err(|e| ApiError::BadRequest(format!("invalid customer id: {e}")))?;
            return Ok(Identity(CartOwner::Customer(CustomerId::from_uuid(uuid))));
        }

        if let Some(value) = parts.headers.get(SESSION_HEADER) {
            let session = value
                .to_str()
                .map_err(|_| ApiError::BadRequest("invalid session id header".to_string()))?;
            if session.is_empty() {
                return Err(ApiError::BadRequest("empty session id".to_string()));
            }
            return Ok(Identity(CartOwner::Guest(session.to_string())));
        }

        Err(ApiError::BadRequest(format!(
            "missing {CUSTOMER_HEADER} or {SESSION_HEADER} header"
        )))
    }
}
