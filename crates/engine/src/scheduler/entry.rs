//! Scheduler entry and timing types.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use repowatch_core::WatchConfig;

use crate::poll::PollJob;

/// Timing shared by every job a scheduler starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTiming {
    /// Delay between two recurring ticks; the first one fires one interval
    /// after activation.
    pub poll_interval: Duration,
    /// Delay before the one-shot replay tick.
    pub startup_delay: Duration,
    /// Whether the one-shot replay tick runs at all.
    pub replay: bool,
}

impl From<&WatchConfig> for JobTiming {
    fn from(config: &WatchConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            startup_delay: config.startup_delay,
            replay: config.replay_enabled(),
        }
    }
}

/// Running job of one subscriber.
pub(super) struct JobEntry {
    pub job: Arc<PollJob>,
    pub shutdown: Arc<Notify>,
    pub handle: JoinHandle<()>,
    pub started_at: DateTime<Utc>,
}

impl JobEntry {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
