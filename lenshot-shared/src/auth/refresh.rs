/// Opaque refresh-token secrets
///
/// Refresh tokens are not JWTs: they are random secrets stored hashed in
/// the `refresh_tokens` table, so they can be individually revoked and
/// rotated. Format: `lsr_{48_chars}` (base62). See
/// [`crate::models::refresh_token`] for rotation and family-revocation
/// semantics.
///
/// # Example
///
/// ```
/// use lenshot_shared::auth::refresh::{generate_refresh_token, hash_refresh_token};
///
/// let (token, hash) = generate_refresh_token();
/// assert!(token.starts_with("lsr_"));
/// assert_eq!(hash, hash_refresh_token(&token));
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

/// Refresh-token prefix
const TOKEN_PREFIX: &str = "lsr_";

/// Length of the random part (characters)
const TOKEN_RANDOM_LENGTH: usize = 48;

/// Generates a new refresh-token secret
///
/// Returns the plaintext token and its SHA-256 hash for storage.
pub fn generate_refresh_token() -> (String, String) {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    let random: String = (0..TOKEN_RANDOM_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect();

    let token = format!("{}{}", TOKEN_PREFIX, random);
    let hash = hash_refresh_token(&token);

    (token, hash)
}

/// Hashes a refresh token with SHA-256, returning 64 hex characters
///
/// Lookups go through the hash, so a database leak never exposes usable
/// tokens.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_refresh_token() {
        let (token1, hash1) = generate_refresh_token();
        let (token2, hash2) = generate_refresh_token();

        assert!(token1.starts_with("lsr_"));
        assert_eq!(token1.len(), 52);
        assert_ne!(token1, token2);
        assert_ne!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let (token, hash) = generate_refresh_token();
        assert_eq!(hash, hash_refresh_token(&token));
    }
}
