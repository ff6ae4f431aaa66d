//! # Lenshot Worker Library
//!
//! This library provides the capture worker: it claims pending jobs,
//! re-validates their targets, drives the capture engine, and finalizes
//! job state with webhook notification.
//!
//! ## Modules
//!
//! - `capturer`: Capture engine contract and the mock engine
//! - `dispatcher`: Worker loop (claim, execute, finalize)
//! - `notify`: Signed webhook delivery
//! - `timeout`: Capture timeout enforcement
//!
//! ## Example
//!
//! ```no_run
//! use lenshot_worker::capturer::{Capturer, MockCapturer};
//!
//! let engine = MockCapturer::new();
//! println!("Engine: {}", engine.name());
//! ```

pub mod capturer;
pub mod dispatcher;
pub mod notify;
pub mod timeout;
