//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id
//! - [`MaybeCaller`]: the verified caller, if a bearer token was sent
//! - [`JsonBody`]: a JSON body whose rejection is an [`AppError`]
//!
//! # Examples
//!
//! ```ignore
//! async fn handler(
//!     caller: MaybeCaller,
//!     JsonBody(body): JsonBody<RateRequest>,
//! ) -> Result<Json<RatingAggregate>, AppError> {
//!     Ok(Json(state.engagement.submit_rating(&id, &body.rating, caller.caller()).await?))
//! }
//! ```

use crate::auth::JwtVerifier;
use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    Json, async_trait,
    extract::{FromRef, FromRequest, FromRequestParts, Request},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
};
use bookshelf_core::{Caller, EngagementError};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Taken from the request extensions when the correlation layer is
/// installed, else from the `X-Correlation-ID` header, else freshly generated.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .or_else(|| {
                parts
                    .headers
                    .get(CORRELATION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| Uuid::parse_str(s).ok())
            })
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// The verified caller, or `None` when no `Authorization` header was sent.
///
/// A header that is present but malformed, forged or expired rejects the
/// request with `401`; the handler never runs.
#[derive(Debug, Clone)]
pub struct MaybeCaller(pub Option<Caller>);

impl MaybeCaller {
    /// Borrow the caller, as the services expect it.
    #[must_use]
    pub const fn caller(&self) -> Option<&Caller> {
        self.0.as_ref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeCaller
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Self(None));
        };

        let verifier = Arc::<JwtVerifier>::from_ref(state);
        let caller = header
            .to_str()
            .map_err(|_| crate::auth::TokenError::Malformed)
            .and_then(|value| verifier.verify_header(value))
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer token");
                AppError::from(EngagementError::AuthenticationRequired)
            })?;

        Ok(Self(Some(caller)))
    }
}

/// JSON request body.
///
/// Like [`Json`], but an unreadable body is reported in the same
/// `{code, message}` shape as every other error.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| {
                if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    AppError::payload_too_large(rejection.body_text())
                } else {
                    AppError::bad_request(rejection.body_text())
                }
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use bookshelf_core::{Role, UserId};
    use chrono::Duration;

    fn verifier() -> Arc<JwtVerifier> {
        Arc::new(JwtVerifier::new(b"extractor-test-secret", None).unwrap())
    }

    async fn extract(verifier: &Arc<JwtVerifier>, auth: Option<&str>) -> Result<MaybeCaller, AppError> {
        let mut builder = HttpRequest::builder();
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        let (mut parts, ()) = builder.body(()).expect("Valid request").into_parts();
        MaybeCaller::from_request_parts(&mut parts, verifier).await
    }

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let req = HttpRequest::builder()
            .header(CORRELATION_ID_HEADER, uuid.to_string())
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn test_correlation_id_generates_new() {
        let (mut parts, ()) = HttpRequest::builder()
            .body(())
            .expect("Valid request")
            .into_parts();
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_ne!(correlation_id.0, Uuid::nil());
    }

    #[tokio::test]
    async fn test_missing_header_is_anonymous() {
        let caller = extract(&verifier(), None).await.unwrap();
        assert!(caller.0.is_none());
    }

    #[tokio::test]
    async fn test_valid_token_yields_caller() {
        let verifier = verifier();
        let alice = Caller::new(UserId::new("u1"), "alice").with_role(Role::Reader);
        let token = verifier.issue(&alice, Duration::minutes(5)).unwrap();

        let caller = extract(&verifier, Some(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(caller.0, Some(alice));
    }

    #[tokio::test]
    async fn test_bad_token_is_unauthorized() {
        let err = extract(&verifier(), Some("Bearer not-a-jwt"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
