//! Federation protocol primitives
//!
//! Token derivation and validation, pull scheduling, link construction,
//! proposal notifications and the outbound client.

mod client;
mod link;
mod notifier;
mod schedule;
mod tokens;

pub use client::*;
pub use link::*;
pub use notifier::*;
pub use schedule::*;
pub use tokens::*;
