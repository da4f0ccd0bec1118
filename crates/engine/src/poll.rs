//! Poll job: one fetch-dedup-notify cycle for one subscriber.
//!
//! A tick walks the subscriber's repositories (snapshot taken at tick
//! start), fetches each one under a timeout, plans deliveries with
//! [`plan_deliveries`] and sends them one by one. Every failure is contained
//! to its repository: the rest of the tick carries on, and the watermark of
//! the failing repository never moves past a change whose delivery was not
//! confirmed.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use repowatch_core::{AdvancePolicy, RepoAddress, Revision, SubscriberId, WatchConfig};
use repowatch_notify::{MessageFormatter, Notifier, NotifyError};

use crate::dedup::plan_deliveries;
use crate::registry::SharedRegistry;
use crate::source::{ChangeSource, SourceError};

/// Per-tick knobs taken from [`WatchConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub fetch_limit: usize,
    pub replay_count: usize,
    pub fetch_timeout: Duration,
    pub advance_policy: AdvancePolicy,
}

impl From<&WatchConfig> for PollSettings {
    fn from(config: &WatchConfig) -> Self {
        Self {
            fetch_limit: config.fetch_limit,
            replay_count: config.startup_replay_count,
            fetch_timeout: config.fetch_timeout,
            advance_policy: config.advance_policy,
        }
    }
}

/// Collaborators shared by every poll job.
pub struct PollContext {
    pub registry: SharedRegistry,
    pub source: Arc<dyn ChangeSource>,
    pub notifier: Arc<dyn Notifier>,
    pub formatter: MessageFormatter,
    pub settings: PollSettings,
}

/// Why one repository was cut short during a tick.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] SourceError),

    #[error("rendering r{revision} failed after {delivered} deliveries: {source}")]
    Render {
        revision: Revision,
        delivered: usize,
        #[source]
        source: NotifyError,
    },

    #[error("delivering r{revision} failed after {delivered} deliveries: {source}")]
    Delivery {
        revision: Revision,
        delivered: usize,
        #[source]
        source: NotifyError,
    },
}

impl PollError {
    /// Notifications confirmed before the failure.
    pub fn delivered(&self) -> usize {
        match self {
            PollError::Fetch(_) => 0,
            PollError::Render { delivered, .. } | PollError::Delivery { delivered, .. } => {
                *delivered
            }
        }
    }
}

/// A repository that did not complete during a tick.
#[derive(Debug)]
pub struct RepoFailure {
    pub repo: RepoAddress,
    pub error: PollError,
}

/// Outcome of one tick.
#[derive(Debug)]
pub struct TickReport {
    pub subscriber: SubscriberId,
    /// Repositories visited (snapshot size).
    pub repositories: usize,
    /// Notifications confirmed by the notifier.
    pub delivered: usize,
    pub failures: Vec<RepoFailure>,
}

impl TickReport {
    fn new(subscriber: SubscriberId) -> Self {
        Self {
            subscriber,
            repositories: 0,
            delivered: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Lock held for the whole of a tick.
///
/// Every job built for one subscriber must share the same lock, so a job
/// started after a cancel waits for the cancelled job's last tick.
pub type TickLock = Arc<Mutex<()>>;

/// Recurring unit of work bound to one subscriber.
pub struct PollJob {
    subscriber: SubscriberId,
    context: Arc<PollContext>,
    tick_lock: TickLock,
}

impl PollJob {
    /// Job with a lock of its own.
    pub fn new(subscriber: SubscriberId, context: Arc<PollContext>) -> Self {
        Self::with_tick_lock(subscriber, context, TickLock::default())
    }

    pub fn with_tick_lock(
        subscriber: SubscriberId,
        context: Arc<PollContext>,
        tick_lock: TickLock,
    ) -> Self {
        Self {
            subscriber,
            context,
            tick_lock,
        }
    }

    pub fn subscriber(&self) -> &SubscriberId {
        &self.subscriber
    }

    /// Run one tick over the subscriber's repositories.
    ///
    /// An unknown subscriber, or one without repositories, makes this a no-op.
    pub async fn tick(&self) -> TickReport {
        let _serialized = self.tick_lock.lock().await;
        let mut report = TickReport::new(self.subscriber.clone());

        let repos = self.context.registry.list(&self.subscriber).await;
        if repos.is_empty() {
            debug!(subscriber = %self.subscriber, "no repositories registered, skipping tick");
            return report;
        }

        for repo in repos {
            report.repositories += 1;
            match self.poll_repository(&repo).await {
                Ok(delivered) => report.delivered += delivered,
                Err(error) => {
                    warn!(
                        subscriber = %self.subscriber,
                        repo = %repo,
                        source = self.context.source.name(),
                        error = %error,
                        "repository poll incomplete"
                    );
                    report.delivered += error.delivered();
                    report.failures.push(RepoFailure { repo, error });
                }
            }
        }

        report
    }

    async fn poll_repository(&self, repo: &RepoAddress) -> Result<usize, PollError> {
        let ctx = &self.context;
        let settings = ctx.settings;

        // Registered at snapshot time but gone now: nothing to do.
        let Some(watermark) = ctx.registry.watermark(&self.subscriber, repo).await else {
            return Ok(0);
        };

        let fetch = ctx.source.fetch_since(repo, watermark, settings.fetch_limit);
        let records = tokio::time::timeout(settings.fetch_timeout, fetch)
            .await
            .map_err(|_| SourceError::Timeout(settings.fetch_timeout))??;

        let plan = plan_deliveries(records, watermark, settings.replay_count);
        if plan.is_empty() {
            return Ok(0);
        }

        let mut delivered = 0;
        for delivery in plan {
            let record = &delivery.record;
            let notification = ctx
                .formatter
                .notification(&self.subscriber, delivery.label, record)
                .map_err(|source| PollError::Render {
                    revision: record.revision,
                    delivered,
                    source,
                })?;

            ctx.notifier
                .send(&notification)
                .await
                .map_err(|source| PollError::Delivery {
                    revision: record.revision,
                    delivered,
                    source,
                })?;
            delivered += 1;

            let advance = match settings.advance_policy {
                AdvancePolicy::FirstDelivered => delivered == 1,
                AdvancePolicy::EachDelivered => true,
            };
            if advance {
                ctx.registry
                    .advance_watermark(&self.subscriber, repo, record.timestamp)
                    .await;
            }
        }

        info!(
            subscriber = %self.subscriber,
            repo = %repo,
            delivered,
            replay = watermark.is_unseen(),
            channel = ctx.notifier.channel_name(),
            "changes delivered"
        );
        Ok(delivered)
    }
}
