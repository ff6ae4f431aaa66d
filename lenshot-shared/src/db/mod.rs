/// Database access layer
///
/// - [`pool`]: PostgreSQL connection pool construction and health checks
/// - [`migrations`]: Embedded schema migrations

pub mod migrations;
pub mod pool;
