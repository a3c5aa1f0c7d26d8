//! The auth gate: turns a bearer token into a [`UserId`].
//!
//! The gateway only accepts HS256-signed JWTs carrying a `user_id` claim
//! and an `exp` claim. Validation happens during the HTTP upgrade, before
//! any WebSocket frame is exchanged, so a refused client never becomes a
//! connection.
//!
//! # Why the algorithm check comes first
//!
//! A JWT names its own signing algorithm in its header. If the verifier
//! believed that header blindly, an attacker could relabel a token as
//! `none` (or as an asymmetric algorithm keyed with the public secret) and
//! skip the real check. [`JwtAuthenticator`] reads the header, refuses
//! anything that is not HS256 as [`AuthError::Malformed`], and only then
//! checks the signature.

use std::time::Duration;

use chatgate_protocol::UserId;
use chrono::Utc;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use serde::{Deserialize, Serialize};

use crate::AuthError;

/// Validates a client's bearer credential and returns their identity.
///
/// Synchronous on purpose: it runs inside the upgrade callback, which must
/// answer before the handshake response is written. Anything that needs
/// I/O to validate a token belongs in front of the gateway, not here.
pub trait Authenticator: Send + Sync + 'static {
    /// Validates `token` and returns the user it belongs to.
    ///
    /// # Errors
    /// One of the [`AuthError`] variants describing why the token was
    /// refused.
    fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;
}

/// The claims chatgate reads from (and writes into) a token.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: String,
    exp: i64,
    #[serde(default)]
    iat: i64,
}

// ---------------------------------------------------------------------------
// JwtAuthenticator
// ---------------------------------------------------------------------------

/// HS256 JWT validation against one shared secret.
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is compared against the current second with no grace.
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Checks signature, algorithm and expiry, then extracts `user_id`.
    ///
    /// # Errors
    /// - [`AuthError::Malformed`]: unparseable token, non-HS256 header,
    ///   missing or empty `user_id`, or missing `exp`.
    /// - [`AuthError::SignatureInvalid`]: signed with a different secret.
    /// - [`AuthError::Expired`]: `exp` is at or before now.
    pub fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        let header =
            decode_header(token).map_err(|e| AuthError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthError::Malformed(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }

        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(classify)?;

        // The library accepts `exp == now`; a token is already dead at its
        // expiry second.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }

        if data.claims.user_id.is_empty() {
            return Err(AuthError::Malformed("missing user_id claim".into()));
        }

        Ok(UserId::new(data.claims.user_id))
    }

    /// Issues an HS256 token for `user_id` that expires after `ttl`.
    ///
    /// The gateway never calls this on the hot path; it exists for the
    /// demo binary and for tests.
    pub fn issue(&self, user_id: &UserId, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            user_id: user_id.as_str().to_string(),
            exp: now.saturating_add(ttl),
            iat: now,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, token: &str) -> Result<UserId, AuthError> {
        self.validate(token)
    }
}

fn classify(err: JwtError) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Malformed(err.to_string()),
    }
}
