//! Shared domain types for repowatch.
//!
//! Everything here is pure data: identifiers, change records, watermarks and
//! the process-wide [`WatchConfig`]. The engine and notifier crates build on
//! these types; nothing in this crate performs I/O beyond reading the
//! environment.

pub mod change;
pub mod config;
pub mod error;
pub mod ids;

pub use change::{ChangeRecord, NoticeLabel, Watermark};
pub use config::{AdvancePolicy, WatchConfig};
pub use error::WatchError;
pub use ids::{RepoAddress, Revision, SubscriberId};
