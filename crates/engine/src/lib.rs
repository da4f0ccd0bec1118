//! Repository change-watch engine.
//!
//! Subscribers register repositories; a per-subscriber poll job asks a
//! [`ChangeSource`] for recent changes, keeps only those past the stored
//! watermark and hands each one to a [`Notifier`](repowatch_notify::Notifier).
//!
//! - [`registry`]: subscriptions and watermarks
//! - [`source`]: change source trait and the `svn` adapter
//! - [`dedup`]: selection of the changes to deliver
//! - [`poll`]: one tick of one subscriber
//! - [`scheduler`]: per-subscriber background jobs
//! - [`service`] and [`command`]: the command surface

pub mod command;
pub mod dedup;
pub mod poll;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod source;

pub use command::Command;
pub use dedup::{plan_deliveries, Delivery};
pub use poll::{PollContext, PollError, PollJob, PollSettings, RepoFailure, TickLock, TickReport};
pub use registry::{SharedRegistry, SubscriptionRegistry};
pub use scheduler::{Activation, JobTiming, Scheduler};
pub use service::{AddOutcome, Listing, WatchService};
pub use source::{ChangeSource, SourceError, SvnLogSource};
