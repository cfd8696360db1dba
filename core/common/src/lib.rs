//! Common types shared across the worldsync crates.
//!
//! Provides the error taxonomy used by every provider and the validated
//! name types that identify instances and their backups.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{BackupName, Instance, InstanceName};
