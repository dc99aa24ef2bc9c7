//! Bearer-credential verification for socket handshakes and HTTP requests.
//!
//! Tokens are HS256 JWTs whose `userId` claim carries the account id.
//! Issuance (login, registration, OAuth) lives in an external auth service
//! that shares `JWT_SECRET` with this server; the core only verifies.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chatflow_store::{Database, User};

use crate::error::ServerError;

/// Claims carried by an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Account id of the bearer.
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Decode and verify a bearer token, returning the claimed user id.
///
/// Fails with [`ServerError::Unauthenticated`] on a missing, malformed, or
/// expired token.
pub fn verify_token(token: &str, secret: &str) -> Result<Uuid, ServerError> {
    if token.is_empty() {
        return Err(ServerError::Unauthenticated("no token provided".into()));
    }

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ServerError::Unauthenticated("token has expired".into())
        }
        _ => ServerError::Unauthenticated("invalid token".into()),
    })?;

    Ok(data.claims.user_id)
}

/// Verify a token and resolve the identity it names.
///
/// The decoded subject may have been deleted since issuance; that case is
/// [`ServerError::IdentityNotFound`], distinct from a bad token.
pub fn authenticate(db: &Database, token: &str, secret: &str) -> Result<User, ServerError> {
    let user_id = verify_token(token, secret)?;
    match db.find_user_by_id(user_id) {
        Ok(user) => Ok(user),
        Err(chatflow_store::StoreError::NotFound) => Err(ServerError::IdentityNotFound(user_id)),
        Err(other) => Err(other.into()),
    }
}

/// Extract the token from an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, ServerError> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ServerError::Unauthenticated("access token required".into()))
}
