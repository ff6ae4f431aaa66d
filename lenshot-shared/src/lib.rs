//! # Lenshot Shared Library
//!
//! This crate contains the types, persistence layer, and security primitives
//! shared by the Lenshot API server and the capture worker.
//!
//! ## Module Organization
//!
//! - `models`: Database models (users, refresh tokens, API keys, jobs, usage)
//! - `auth`: Password hashing, access tokens, API keys, the request authenticator
//! - `plans`: Subscription plan catalog and per-plan limits
//! - `quota`: Atomic usage metering against plan limits
//! - `safety`: Outbound URL validation (SSRF guard)
//! - `db`: Connection pool and migrations

pub mod auth;
pub mod db;
pub mod models;
pub mod plans;
pub mod quota;
pub mod safety;

/// Current version of the Lenshot shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
