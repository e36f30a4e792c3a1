//! Bearer token verification.
//!
//! Callers authenticate with `Authorization: Bearer <jwt>`, signed with
//! HS256 using the configured secret. A verified token becomes a [`Caller`].
//!
//! ## Claims
//!
//! | Claim | Meaning |
//! |---|---|
//! | `sub` | user id |
//! | `username` | optional display handle |
//! | `email` | optional, preferred as display name |
//! | `role` | `reader` (default), `creator` or `admin` |
//! | `exp` | expiry, seconds since the epoch |
//! | `iss` | checked only when an issuer is configured |

use bookshelf_core::{Caller, Role, UserId};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display name used when a token names neither an email nor a username.
pub const ANONYMOUS: &str = "Anonymous";

/// Token verification errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The verifier cannot be built from the given settings
    #[error("JWT configuration error: {0}")]
    Config(String),
    /// The `Authorization` header is not a bearer token
    #[error("Malformed authorization header")]
    Malformed,
    /// The token has expired
    #[error("Token expired")]
    Expired,
    /// Signature, issuer or claims are invalid
    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// JWT claims carried by caller tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Display handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Platform role
    #[serde(default)]
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    /// Name shown next to this caller's comments: email, else username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        [self.email.as_deref(), self.username.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS)
    }

    /// The caller these claims describe.
    #[must_use]
    pub fn into_caller(self) -> Caller {
        let display_name = self.display_name().to_string();
        Caller::new(UserId::new(self.sub), display_name).with_role(self.role)
    }
}

/// Verifies (and, for development tooling, issues) caller tokens.
#[derive(Clone)]
pub struct JwtVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("keys", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtVerifier {
    /// Create a verifier for HS256 tokens.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] if the secret is empty.
    pub fn new(secret: &[u8], issuer: Option<String>) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::Config("JWT secret must not be empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &issuer {
            validation.set_issuer(&[issuer.as_str()]);
            validation.set_required_spec_claims(&["exp", "iss"]);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer,
        })
    }

    /// Verify a raw token.
    ///
    /// # Errors
    ///
    /// - [`TokenError::Expired`]: `exp` is in the past
    /// - [`TokenError::Invalid`]: bad signature, issuer or claims
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }

    /// Verify the value of an `Authorization` header.
    ///
    /// # Errors
    ///
    /// [`TokenError::Malformed`] if the value is not `Bearer <token>`, plus
    /// everything [`verify`](Self::verify) returns.
    pub fn verify_header(&self, value: &str) -> Result<Caller, TokenError> {
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(TokenError::Malformed)?;
        self.verify(token).map(Claims::into_caller)
    }

    /// Sign a token for a caller, valid for `ttl`.
    ///
    /// Used by tests and local tooling; production tokens come from the
    /// identity provider.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Invalid`] if encoding fails.
    pub fn issue(&self, caller: &Caller, ttl: Duration) -> Result<String, TokenError> {
        let claims = Claims {
            sub: caller.user_id.to_string(),
            username: Some(caller.display_name.clone()),
            email: None,
            role: caller.role,
            exp: (Utc::now() + ttl).timestamp(),
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-with-enough-entropy!";

    fn alice() -> Caller {
        Caller::new(UserId::new("u1"), "alice").with_role(Role::Creator)
    }

    #[test]
    fn issued_tokens_verify_back_to_the_caller() {
        let verifier = JwtVerifier::new(SECRET, None).unwrap();
        let token = verifier.issue(&alice(), Duration::hours(1)).unwrap();

        let caller = verifier.verify_header(&format!("Bearer {token}")).unwrap();
        assert_eq!(caller, alice());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let verifier = JwtVerifier::new(SECRET, None).unwrap();
        let token = verifier.issue(&alice(), Duration::hours(-2)).unwrap();

        assert_eq!(verifier.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let other = JwtVerifier::new(b"another-secret", None).unwrap();
        let token = other.issue(&alice(), Duration::hours(1)).unwrap();

        let verifier = JwtVerifier::new(SECRET, None).unwrap();
        assert!(matches!(verifier.verify(&token), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn configured_issuer_is_enforced() {
        let issuer = JwtVerifier::new(SECRET, Some("bookshelf".to_string())).unwrap();
        let anonymous_issuer = JwtVerifier::new(SECRET, None).unwrap();
        let token = anonymous_issuer.issue(&alice(), Duration::hours(1)).unwrap();

        assert!(issuer.verify(&token).is_err());
        let own = issuer.issue(&alice(), Duration::hours(1)).unwrap();
        assert!(issuer.verify(&own).is_ok());
    }

    #[test]
    fn tokens_without_issuer_claim_are_rejected_when_issuer_configured() {
        let verifier = JwtVerifier::new(SECRET, Some("bookshelf".to_string())).unwrap();
        let token = JwtVerifier::new(SECRET, None)
            .unwrap()
            .issue(&alice(), Duration::hours(1))
            .unwrap();
        assert!(matches!(verifier.verify(&token), Err(TokenError::Invalid(_))));

        let foreign = JwtVerifier::new(SECRET, Some("elsewhere".to_string()))
            .unwrap()
            .issue(&alice(), Duration::hours(1))
            .unwrap();
        assert!(matches!(verifier.verify(&foreign), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn header_must_be_a_bearer_token() {
        let verifier = JwtVerifier::new(SECRET, None).unwrap();
        assert_eq!(verifier.verify_header("Basic abc"), Err(TokenError::Malformed));
        assert_eq!(verifier.verify_header("Bearer "), Err(TokenError::Malformed));
    }

    #[test]
    fn empty_secret_is_a_config_error() {
        assert!(matches!(
            JwtVerifier::new(b"", None),
            Err(TokenError::Config(_))
        ));
    }

    #[test]
    fn display_name_prefers_email_then_username() {
        let mut claims = Claims {
            sub: "u1".to_string(),
            username: Some("alice".to_string()),
            email: Some("alice@example.com".to_string()),
            role: Role::Reader,
            exp: 0,
            iss: None,
        };
        assert_eq!(claims.display_name(), "alice@example.com");

        claims.email = None;
        assert_eq!(claims.display_name(), "alice");

        claims.username = Some("  ".to_string());
        assert_eq!(claims.display_name(), ANONYMOUS);
    }

    #[test]
    fn role_defaults_to_reader() {
        let claims: Claims = serde_json::from_str(r#"{"sub":"u1","exp":0}"#).unwrap();
        assert_eq!(claims.role, Role::Reader);
        assert_eq!(claims.into_caller().display_name, ANONYMOUS);
    }
}
