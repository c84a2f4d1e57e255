//! Storage layer for the federation engine
//!
//! Uses RocksDB for the catalog, registrations and proposals.

mod catalog;
mod federation_store;
mod rocks;

pub use catalog::*;
pub use federation_store::*;
pub use rocks::*;
