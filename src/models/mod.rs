//! Data models for the federation engine

mod error;
mod proposal;
mod registration;
mod repository;
mod token;
mod user;

pub use error::*;
pub use proposal::*;
pub use registration::*;
pub use repository::*;
pub use token::*;
pub use user::*;
