//! worldsync background dispatch
//!
//! This module runs provider operations off the caller's task:
//! - Job requests for backup, restore and delete
//! - A dispatcher loop that executes each job on its own task
//! - Retry strategy with exponential backoff for transient failures
//! - Job status tracking

pub mod dispatcher;
pub mod job;
pub mod retry;
pub mod state;

// Re-export main types
pub use dispatcher::{DispatchConfig, DispatcherHandle, JobTicket, SyncDispatcher};
pub use job::{JobId, JobKind, JobRequest};
pub use retry::RetryPolicy;
pub use state::{JobRecord, JobStatus, JobTracker};
