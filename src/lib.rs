//! Watch a project directory and keep it committed and pushed.
//!
//! Raw filesystem notifications flow through [`handler::WatchHandler`]
//! (filter, debounce, content digest, backup snapshot) into a pending change
//! set that [`scheduler::BatchTimer`] flushes once the tree has been quiet for
//! the batch window. [`watch::WatchService`] owns the session lifecycle.

pub mod activity;
pub mod backup;
pub mod config;
pub mod digest;
pub mod filter;
pub mod git;
pub mod handler;
pub mod scheduler;
pub mod watch;

pub use activity::ActivityLog;
pub use config::{ConfigError, WatchConfig};
pub use handler::{FlushReport, FsEvent, PendingChangeSet, WatchHandler};
pub use watch::WatchService;
