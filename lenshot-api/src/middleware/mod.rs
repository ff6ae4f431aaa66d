/// Middleware modules for the API server
///
/// This module contains custom middleware for:
/// - Security headers
/// - Request-ID correlation

pub mod request_id;
pub mod security;
