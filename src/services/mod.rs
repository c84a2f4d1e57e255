//! Service layer for the federation protocol

mod federation_service;
mod proposal_service;
mod pull_service;
mod status_service;

pub use federation_service::*;
pub use proposal_service::*;
pub use pull_service::*;
pub use status_service::*;
