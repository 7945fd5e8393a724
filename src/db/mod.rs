//! Persistence for monitored targets.
//!
//! Records live in a single SQLite table and are created by an embedded
//! migration on open.

mod models;
mod store;

pub use models::*;
pub use store::*;
