//! Per-subscriber job scheduling.
//!
//! Each activated subscriber gets one tokio task that owns its [`PollJob`]:
//! an optional one-shot replay tick shortly after activation, then the
//! recurring tick every poll interval. Because both run inside the same task,
//! ticks of one subscriber never overlap, while different subscribers poll
//! fully independently.
//!
//! [`PollJob`]: crate::poll::PollJob

mod core;
mod entry;
mod job;


pub use self::core::{Activation, Scheduler};
pub use self::entry::JobTiming;
