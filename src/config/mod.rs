//! Configuration module for the federation server
//!
//! Supports loading configuration from TOML files and environment variables.

mod settings;

pub use settings::*;
