/// API key primitives
///
/// Key generation, hashing, and scope matching. Database operations live in
/// [`crate::models::api_key`].
///
/// # Key Format
///
/// `lens_{32_chars}` (37 chars total): the fixed `lens_` prefix followed by
/// 32 random base62 characters. Keys are hashed with SHA-256 before storage;
/// the plaintext exists only in the creation response.
///
/// # Example
///
/// ```
/// use lenshot_shared::auth::api_key::{generate_api_key, hash_api_key, validate_api_key_format};
///
/// let (key, hash) = generate_api_key();
/// assert!(key.starts_with("lens_"));
/// assert_eq!(key.len(), 37);
/// assert!(validate_api_key_format(&key));
/// assert_eq!(hash, hash_api_key(&key));
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of the random part of the key (characters)
const KEY_RANDOM_LENGTH: usize = 32;

/// API key prefix
const KEY_PREFIX: &str = "lens_";

/// Total length of an API key (prefix + random)
pub const API_KEY_LENGTH: usize = 37;

/// Scope granting job submission
pub const SCOPE_CREATE: &str = "screenshots:create";

/// Scope granting job listing and retrieval
pub const SCOPE_READ: &str = "screenshots:read";

/// Scope granting job deletion
pub const SCOPE_DELETE: &str = "screenshots:delete";

/// Generates a new API key
///
/// Returns the plaintext key and its SHA-256 hash for storage. Key space is
/// 62^32 (roughly 2^190) combinations.
pub fn generate_api_key() -> (String, String) {
    let key = format!("{}{}", KEY_PREFIX, generate_random_string(KEY_RANDOM_LENGTH));
    let hash = hash_api_key(&key);

    (key, hash)
}

/// Generates a random base62 string
fn generate_random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Hashes an API key with SHA-256, returning 64 hex characters
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extracts the 10-character display prefix of a key
///
/// The prefix is stored alongside the hash; it indexes candidate rows during
/// verification and is the only part of the key ever shown after creation.
pub fn display_prefix(key: &str) -> String {
    key.chars().take(10).collect()
}

/// Builds the masked display form of a key, e.g. `lens_ab12...wxyz`
pub fn mask_key(prefix: &str, last_four: &str) -> String {
    format!("{}...{}", prefix, last_four)
}

/// Validates API key format without touching the store
///
/// Checks the `lens_` prefix, the total length, and that the random part is
/// alphanumeric. A format failure never needs a database round trip.
pub fn validate_api_key_format(key: &str) -> bool {
    if key.len() != API_KEY_LENGTH {
        return false;
    }

    if !key.starts_with(KEY_PREFIX) {
        return false;
    }

    let random_part = &key[KEY_PREFIX.len()..];
    random_part.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Verifies a plaintext key against a stored hash
///
/// Uses constant-time comparison over the computed and stored SHA-256 hex
/// digests to prevent timing side-channels.
pub fn verify_api_key(key: &str, stored_hash: &str) -> bool {
    let computed_hash = hash_api_key(key);
    constant_time_compare(&computed_hash, stored_hash)
}

/// Constant-time string comparison
///
/// Compares all bytes and accumulates differences with bitwise OR so the
/// running time never depends on where the strings first differ.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    let mut result = 0u8;
    for i in 0..a_bytes.len() {
        result |= a_bytes[i] ^ b_bytes[i];
    }

    result == 0
}

/// Checks whether a granted scope list satisfies a required scope
///
/// Supports wildcard matching: `screenshots:*` matches every screenshot
/// scope, and `*` matches everything.
///
/// # Example
///
/// ```
/// use lenshot_shared::auth::api_key::has_scope;
///
/// let scopes = vec!["screenshots:read".to_string(), "screenshots:*".to_string()];
/// assert!(has_scope(&scopes, "screenshots:read"));
/// assert!(has_scope(&scopes, "screenshots:delete"));
/// assert!(!has_scope(&["screenshots:read".to_string()], "screenshots:create"));
/// ```
pub fn has_scope(scopes: &[String], required: &str) -> bool {
    for scope in scopes {
        if scope == "*" || scope == required {
            return true;
        }

        if let Some(prefix) = scope.strip_suffix(":*") {
            if required.starts_with(prefix)
                && required[prefix.len()..].starts_with(':')
            {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_api_key() {
        let (key1, hash1) = generate_api_key();
        let (key2, hash2) = generate_api_key();

        assert!(key1.starts_with("lens_"));
        assert_eq!(key1.len(), 37);
        assert_ne!(key1, key2);
        assert_ne!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let hash = hash_api_key("lens_test123");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_api_key("lens_test123"));
        assert_ne!(hash, hash_api_key("lens_different"));
    }

    #[test]
    fn test_validate_api_key_format() {
        assert!(validate_api_key_format("lens_abcdefghijklmnopqrstuvwxyz123456"));
        assert!(validate_api_key_format("lens_ABCDEFGHIJKLMNOPQRSTUVWXYZ123456"));

        // Wrong prefix
        assert!(!validate_api_key_format("axon_abcdefghijklmnopqrstuvwxyz123456"));
        // Too short / too long
        assert!(!validate_api_key_format("lens_short"));
        assert!(!validate_api_key_format("lens_abcdefghijklmnopqrstuvwxyz1234567890"));
        // Non-alphanumeric payload
        assert!(!validate_api_key_format("lens_abc!@#defghijklmnopqrstuvwxyz12"));
    }

    #[test]
    fn test_verify_api_key() {
        let (key, hash) = generate_api_key();

        assert!(verify_api_key(&key, &hash));
        assert!(!verify_api_key("lens_wrongkey1234567890123456789012", &hash));
        assert!(!verify_api_key("", &hash));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(constant_time_compare("", ""));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hell"));
        assert!(!constant_time_compare("", "not empty"));
    }

    #[test]
    fn test_display_prefix_and_mask() {
        let key = "lens_abc123xyz456";
        assert_eq!(display_prefix(key), "lens_abc12");
        assert_eq!(mask_key("lens_abc12", "3456"), "lens_abc12...3456");
    }

    #[test]
    fn test_has_scope() {
        let scopes = vec![SCOPE_READ.to_string(), SCOPE_CREATE.to_string()];

        assert!(has_scope(&scopes, SCOPE_READ));
        assert!(has_scope(&scopes, SCOPE_CREATE));
        assert!(!has_scope(&scopes, SCOPE_DELETE));
    }

    #[test]
    fn test_has_scope_wildcards() {
        let wildcard = vec!["screenshots:*".to_string()];
        assert!(has_scope(&wildcard, SCOPE_CREATE));
        assert!(has_scope(&wildcard, SCOPE_DELETE));
        // Prefix must stop at a scope boundary
        assert!(!has_scope(&wildcard, "screenshotsadmin:read"));

        let global = vec!["*".to_string()];
        assert!(has_scope(&global, "anything"));

        let empty: Vec<String> = vec![];
        assert!(!has_scope(&empty, SCOPE_READ));
    }
}
