//! HTTP API for the federation engine
//!
//! Serves the `/federation` protocol endpoint, the operator API under
//! `/api/v1` and the health checks.

mod health;
mod host;
mod responses;
mod rest;

pub use health::*;
pub use host::*;
pub use responses::*;
pub use rest::*;
