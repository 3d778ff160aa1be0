//! Configuration model for cmdgpt.
//!
//! This module defines the Config struct that represents `<state_dir>/config.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! defaults for every field, environment overrides, and validation.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use types::LogLevel;
