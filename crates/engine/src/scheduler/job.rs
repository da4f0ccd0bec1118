//! Body of the per-subscriber task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::poll::{PollJob, TickReport};

use super::entry::JobTiming;

/// Drive `job` until `shutdown` is notified.
///
/// A cancel that lands while a tick is in flight takes effect once that tick
/// returns; [`Notify`] keeps the permit until the loop checks it.
pub(super) async fn run_job(job: Arc<PollJob>, timing: JobTiming, shutdown: Arc<Notify>) {
    let activated = Instant::now();

    if timing.replay {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!(subscriber = %job.subscriber(), "cancelled before replay tick");
                return;
            }
            _ = tokio::time::sleep(timing.startup_delay) => {
                log_tick("replay", &job.tick().await);
            }
        }
    }

    let first = activated
        .checked_add(timing.poll_interval)
        .unwrap_or_else(far_future);
    let mut ticker = interval_at(first, timing.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {
                log_tick("recurring", &job.tick().await);
            }
        }
    }

    info!(subscriber = %job.subscriber(), "poll job stopped");
}

/// Stand-in for an instant the clock cannot represent; matches tokio's own
/// cap of roughly thirty years.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365 * 30)
}

fn log_tick(kind: &'static str, report: &TickReport) {
    debug!(
        subscriber = %report.subscriber,
        kind,
        repositories = report.repositories,
        delivered = report.delivered,
        failed = report.failures.len(),
        "tick completed"
    );
}
