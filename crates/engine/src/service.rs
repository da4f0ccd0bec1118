//! [`WatchService`]: the command-level facade over registry and scheduler.
//!
//! Transports (chat bots, a stdin loop, tests) talk to this type only.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use repowatch_core::{RepoAddress, SubscriberId, WatchConfig, WatchError};
use repowatch_notify::{MessageFormatter, Notifier};

use crate::poll::{PollContext, PollSettings, TickReport};
use crate::registry::{SharedRegistry, SubscriptionRegistry};
use crate::scheduler::{Activation, JobTiming, Scheduler};
use crate::source::ChangeSource;

/// Result of [`WatchService::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub repo: RepoAddress,
    /// `false` when the repository was already registered.
    pub added: bool,
    pub activation: Activation,
}

/// Result of [`WatchService::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Empty,
    Repositories(Vec<RepoAddress>),
}

pub struct WatchService {
    registry: SharedRegistry,
    scheduler: Scheduler,
}

impl WatchService {
    pub fn new(
        config: &WatchConfig,
        source: Arc<dyn ChangeSource>,
        notifier: Arc<dyn Notifier>,
        formatter: MessageFormatter,
    ) -> Self {
        let registry = SubscriptionRegistry::shared();
        let context = Arc::new(PollContext {
            registry: Arc::clone(&registry),
            source,
            notifier,
            formatter,
            settings: PollSettings::from(config),
        });
        Self {
            registry,
            scheduler: Scheduler::new(context, JobTiming::from(config)),
        }
    }

    /// Validate `raw`, register it for `subscriber` and make sure the
    /// subscriber is being polled.
    ///
    /// Adding an already registered repository is not an error and keeps its
    /// watermark.
    pub async fn add(&self, subscriber: &SubscriberId, raw: &str) -> Result<AddOutcome, WatchError> {
        let repo = RepoAddress::parse(raw)?;
        let added = self.registry.register(subscriber, repo.clone()).await;
        let activation = self.scheduler.on_subscriber_activated(subscriber).await;
        if added {
            info!(subscriber = %subscriber, repo = %repo, "repository added");
        }
        Ok(AddOutcome {
            repo,
            added,
            activation,
        })
    }

    pub async fn list(&self, subscriber: &SubscriberId) -> Listing {
        let repos = self.registry.list(subscriber).await;
        if repos.is_empty() {
            Listing::Empty
        } else {
            Listing::Repositories(repos)
        }
    }

    /// Explicit activation; a no-op for subscribers without repositories.
    pub async fn start(&self, subscriber: &SubscriberId) -> Activation {
        self.scheduler.on_subscriber_activated(subscriber).await
    }

    pub async fn cancel(&self, subscriber: &SubscriberId) -> bool {
        self.scheduler.cancel(subscriber).await
    }

    pub async fn poll_now(&self, subscriber: &SubscriberId) -> Option<TickReport> {
        self.scheduler.poll_now(subscriber).await
    }

    pub async fn shutdown(&self, grace: Duration) {
        self.scheduler.shutdown(grace).await;
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
