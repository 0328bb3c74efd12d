//! Kometa-AI label classifier: reconciles AI-derived category decisions
//! onto a Radarr movie catalog.
//!
//! The binary entry point lives in `src/main.rs`; everything that matters
//! for a single run is a plain library call so it can be driven from the
//! CLI, the scheduler loop, or a test.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod fingerprint;
pub mod health;
pub mod model;
pub mod oracle;
pub mod orchestrator;
pub mod planner;
pub mod reconcile;
pub mod reporter;
pub mod rubric;
pub mod scheduler;
pub mod smtp;
pub mod store;

pub use error::{KaiError, Result};
