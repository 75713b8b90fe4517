//! Database module.
//!
//! Provides SQLite storage for targets and their latest metrics.

mod models;
mod store;

pub use models::*;
pub use store::*;
