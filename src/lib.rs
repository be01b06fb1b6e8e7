//! pricecall: up/down price predictions with cooldown-gated resolution.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod oracle;
pub mod engine;
pub mod storage;
pub mod api;
