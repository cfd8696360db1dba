//! Backup provider abstraction for worldsync.
//!
//! This crate defines the capability contract every world backup/sync
//! backend implements, the registry that maps provider names to live
//! providers, and the built-in local filesystem and in-memory backends.
//!
//! # Design Principles
//! - Provider isolation: storage layout and failure handling belong to each provider
//! - Async operations: all provider I/O is async and safe to drive from worker tasks
//! - Explicit ownership: registries are plain values built at startup, never globals
//! - Toolkit-agnostic settings: providers describe their options, hosts render them

pub mod catalog;
pub mod config;
mod fsutil;
pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod settings;

pub use catalog::{ProviderCatalog, ProviderFactory};
pub use config::{ProviderConfig, ProvidersConfig};
pub use local::{BackupManifest, LocalProvider};
pub use memory::MemoryProvider;
pub use provider::SyncProvider;
pub use registry::ProviderRegistry;
pub use settings::{SettingField, SettingKind, SettingsDescriptor};
