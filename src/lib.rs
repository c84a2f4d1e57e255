//! Repository Federation Engine
//!
//! Lets hosting instances exchange repositories, users and settings:
//! - Token tiers derived from an instance secret
//! - Pull responses for repositories, users and settings
//! - Proposals from instances asking to be pulled from
//! - Status reports and pull scheduling for registered peers

pub mod api;
pub mod config;
pub mod federation;
pub mod metrics;
pub mod models;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use config::Settings;
pub use federation::{FederationClient, TokenAuthority};
pub use models::{FederationError, FederationRequest, FederationResult, FederationToken};
pub use services::{FederationConfig, FederationService, InboundRequest};
pub use store::{FederationStore, RocksStore};

/// Version of the repo-federation engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
