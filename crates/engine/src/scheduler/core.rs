//! [`Scheduler`]: owns the running poll job of every active subscriber.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use repowatch_core::SubscriberId;

use crate::poll::{PollContext, PollJob, TickLock, TickReport};

use super::entry::{JobEntry, JobTiming};
use super::job::run_job;

/// Result of [`Scheduler::on_subscriber_activated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// A new job was spawned.
    Started,
    /// A job for this subscriber is already running; nothing changed.
    AlreadyActive,
    /// The subscriber has nothing to poll; no job was spawned.
    NoRepositories,
}

pub struct Scheduler {
    context: Arc<PollContext>,
    timing: JobTiming,
    jobs: Mutex<HashMap<SubscriberId, JobEntry>>,
    /// Outlives job entries: a restarted job reuses its predecessor's lock.
    tick_locks: Mutex<HashMap<SubscriberId, TickLock>>,
}

impl Scheduler {
    pub fn new(context: Arc<PollContext>, timing: JobTiming) -> Self {
        Self {
            context,
            timing,
            jobs: Mutex::new(HashMap::new()),
            tick_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn tick_lock(&self, subscriber: &SubscriberId) -> TickLock {
        let mut locks = self.tick_locks.lock().await;
        Arc::clone(locks.entry(subscriber.clone()).or_default())
    }

    /// Ensure a poll job runs for `subscriber`.
    ///
    /// Never starts a second job while one is running. A job that was
    /// cancelled or has finished is replaced by a fresh one, whose ticks
    /// still wait for any tick the old job has in flight.
    pub async fn on_subscriber_activated(&self, subscriber: &SubscriberId) -> Activation {
        if !self.context.registry.has_repositories(subscriber).await {
            debug!(subscriber = %subscriber, "activation ignored, no repositories");
            return Activation::NoRepositories;
        }

        let mut jobs = self.jobs.lock().await;
        if jobs.get(subscriber).is_some_and(JobEntry::is_running) {
            return Activation::AlreadyActive;
        }

        let job = Arc::new(PollJob::with_tick_lock(
            subscriber.clone(),
            Arc::clone(&self.context),
            self.tick_lock(subscriber).await,
        ));
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(run_job(Arc::clone(&job), self.timing, Arc::clone(&shutdown)));

        jobs.insert(
            subscriber.clone(),
            JobEntry {
                job,
                shutdown,
                handle,
                started_at: Utc::now(),
            },
        );
        info!(
            subscriber = %subscriber,
            interval = ?self.timing.poll_interval,
            replay = self.timing.replay,
            "poll job started"
        );
        Activation::Started
    }

    /// Stop the subscriber's job. Returns whether a running job was stopped.
    pub async fn cancel(&self, subscriber: &SubscriberId) -> bool {
        let Some(entry) = self.jobs.lock().await.remove(subscriber) else {
            return false;
        };
        let running = entry.is_running();
        entry.shutdown.notify_one();
        if running {
            info!(
                subscriber = %subscriber,
                since = %entry.started_at,
                "poll job cancelled"
            );
        }
        running
    }

    /// Run one tick right now, serialized with the scheduled ones.
    ///
    /// Returns `None` when the subscriber has no running job.
    pub async fn poll_now(&self, subscriber: &SubscriberId) -> Option<TickReport> {
        let job = {
            let jobs = self.jobs.lock().await;
            let entry = jobs.get(subscriber).filter(|e| e.is_running())?;
            Arc::clone(&entry.job)
        };
        Some(job.tick().await)
    }

    pub async fn is_active(&self, subscriber: &SubscriberId) -> bool {
        self.jobs
            .lock()
            .await
            .get(subscriber)
            .is_some_and(JobEntry::is_running)
    }

    pub async fn active_count(&self) -> usize {
        self.jobs
            .lock()
            .await
            .values()
            .filter(|e| e.is_running())
            .count()
    }

    /// Cancel every job and wait up to `grace` for them to stop.
    ///
    /// Jobs still busy when the grace period runs out are aborted.
    pub async fn shutdown(&self, grace: Duration) {
        let entries: Vec<(SubscriberId, JobEntry)> = self.jobs.lock().await.drain().collect();
        if entries.is_empty() {
            return;
        }
        info!(jobs = entries.len(), "stopping poll jobs");

        for (_, entry) in &entries {
            entry.shutdown.notify_one();
        }

        let deadline = tokio::time::Instant::now() + grace;
        for (subscriber, mut entry) in entries {
            if tokio::time::timeout_at(deadline, &mut entry.handle).await.is_err() {
                warn!(subscriber = %subscriber, "poll job did not stop in time, aborting");
                entry.handle.abort();
            }
        }
    }
}
