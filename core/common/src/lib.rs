//! Common utilities and types shared across driveconnect crates.
//!
//! This crate provides the error type used by the Drive client core and the
//! CLI, plus small strongly typed identifiers.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::FileId;
