/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Authentication endpoints (register, login, refresh, logout, me)
/// - `api_keys`: API key management endpoints
/// - `screenshots`: Capture job submission and management
/// - `subscriptions`: Usage and plan catalog

pub mod api_keys;
pub mod auth;
pub mod health;
pub mod screenshots;
pub mod subscriptions;
