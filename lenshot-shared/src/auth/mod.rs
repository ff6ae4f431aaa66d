/// Authentication primitives for Lenshot
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength validation
/// - [`jwt`]: Short-lived stateless access tokens
/// - [`refresh`]: Opaque refresh-token secrets (stored hashed, rotated)
/// - [`api_key`]: API key generation, hashing, and scope matching
/// - [`middleware`]: The request authenticator producing a [`middleware::Principal`]
///
/// # Security Properties
///
/// - Passwords: Argon2id, 64 MB memory, 3 iterations
/// - Access tokens: HS256, verification is pure (no store lookup)
/// - API keys and refresh tokens: SHA-256 hashed at rest, plaintext shown once
/// - All secret comparisons are constant-time

pub mod api_key;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod refresh;
