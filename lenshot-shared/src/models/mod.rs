/// Database models for Lenshot
///
/// Each model is a struct with static async methods over a `PgPool`.
/// Contended mutations (quota reservation, state transitions, revocations)
/// are single conditional-update statements, never read-then-write.
///
/// # Models
///
/// - `user`: Accounts, hashed passwords, plan membership
/// - `refresh_token`: Rotating session records with family revocation
/// - `api_key`: Hashed API keys with scopes and whitelists
/// - `job`: Screenshot jobs and their state machine
/// - `usage`: Per-user, per-period capture counters

pub mod api_key;
pub mod job;
pub mod refresh_token;
pub mod usage;
pub mod user;
