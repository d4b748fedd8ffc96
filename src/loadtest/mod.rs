//! Virtual-user load testing engine.
//!
//! Provides typed TOML configuration, a shared HTTP client, batch scenarios
//! with named checks, and the engine that runs virtual users against a
//! target for a fixed duration.

pub mod checks;
pub mod client;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod scenario;
pub mod summary;
pub mod vu;
