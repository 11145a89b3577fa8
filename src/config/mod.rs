//! Configuration module
//!
//! Loads and validates the bot configuration: guild, log channel, role ids,
//! phase lengths and the data file location.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLoader, LoadResult, LoadWarning};
pub use schema::*;
pub use validation::{ValidationResult, Validator};
