/// Access-token generation and validation
///
/// Lenshot sessions use two credentials: a short-lived stateless access token
/// (this module) and a long-lived opaque refresh token stored server-side
/// (see [`crate::auth::refresh`] and [`crate::models::refresh_token`]).
///
/// Access tokens are HS256-signed JWTs carrying the user id and plan, so
/// per-request verification is a pure signature + expiry check with no
/// store lookup.
///
/// # Example
///
/// ```
/// use lenshot_shared::auth::jwt::{create_token, validate_access_token, Claims};
/// use lenshot_shared::plans::Plan;
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let user_id = Uuid::new_v4();
/// let secret = "your-secret-key-at-least-32-bytes-long";
///
/// let claims = Claims::new(user_id, Plan::Free, Duration::minutes(15));
/// let token = create_token(&claims, secret)?;
///
/// let validated = validate_access_token(&token, secret)?;
/// assert_eq!(validated.sub, user_id);
/// # Ok(())
/// # }
/// ```

use crate::plans::Plan;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token issuer claim value
const ISSUER: &str = "lenshot";

/// Error type for token operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Failed to validate token
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,
}

/// Access-token claims
///
/// Standard claims (`sub`, `iss`, `iat`, `exp`, `nbf`) plus the user's plan,
/// carried so quota-adjacent handlers never need a user lookup just to learn
/// the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user ID
    pub sub: Uuid,

    /// Issuer - always "lenshot"
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Subscription plan at issue time (custom claim)
    pub plan: Plan,
}

impl Claims {
    /// Creates access-token claims valid for `ttl` from now
    pub fn new(user_id: Uuid, plan: Plan, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            nbf: now.timestamp(),
            plan,
        }
    }

    /// Checks if the token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims into a JWT
///
/// The secret should be at least 32 bytes of cryptographic randomness and
/// rotated periodically.
///
/// # Errors
///
/// Returns `JwtError::CreateError` if encoding fails.
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates an access token and extracts its claims
///
/// Verifies the signature, expiry, not-before, and issuer. This is the only
/// check performed per request for bearer principals; there is deliberately
/// no revocation lookup for access tokens (they are short-lived; revocation
/// acts on refresh tokens).
///
/// # Errors
///
/// Returns `JwtError::Expired` for an expired token, otherwise
/// `JwtError::ValidationError`.
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_claims_creation() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, Plan::Pro, Duration::minutes(15));

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "lenshot");
        assert_eq!(claims.plan, Plan::Pro);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_create_and_validate_token() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, Plan::Starter, Duration::minutes(15));
        let token = create_token(&claims, SECRET).expect("Should create token");

        let validated = validate_access_token(&token, SECRET).expect("Should validate token");
        assert_eq!(validated.sub, user_id);
        assert_eq!(validated.plan, Plan::Starter);
        assert_eq!(validated.iss, "lenshot");
    }

    #[test]
    fn test_validate_with_wrong_secret() {
        let claims = Claims::new(Uuid::new_v4(), Plan::Free, Duration::minutes(15));
        let token = create_token(&claims, SECRET).expect("Should create token");

        assert!(validate_access_token(&token, "wrong-secret-also-32-bytes-long!").is_err());
    }

    #[test]
    fn test_validate_expired_token() {
        let claims = Claims::new(Uuid::new_v4(), Plan::Free, Duration::seconds(-3600));
        assert!(claims.is_expired());

        let token = create_token(&claims, SECRET).expect("Should create token");
        let result = validate_access_token(&token, SECRET);

        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(validate_access_token("not.a.token", SECRET).is_err());
        assert!(validate_access_token("", SECRET).is_err());
    }
}
