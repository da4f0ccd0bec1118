//! Subscription registry and watermark store.
//!
//! Holds, per subscriber, the repositories they watch (in registration
//! order) and the watermark of each. The outer map is only locked long
//! enough to find a subscriber's entry; every read or mutation of that
//! entry then happens under the subscriber's own lock, so operations on
//! different subscribers never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use repowatch_core::{RepoAddress, SubscriberId, Watermark};

type Subscription = IndexMap<RepoAddress, Watermark>;

/// Shared handle to a [`SubscriptionRegistry`].
pub type SharedRegistry = Arc<SubscriptionRegistry>;

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Arc<Mutex<Subscription>>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(Self::new())
    }

    async fn entry(&self, subscriber: &SubscriberId) -> Option<Arc<Mutex<Subscription>>> {
        self.subscribers.read().await.get(subscriber).cloned()
    }

    async fn entry_or_insert(&self, subscriber: &SubscriberId) -> Arc<Mutex<Subscription>> {
        if let Some(entry) = self.entry(subscriber).await {
            return entry;
        }
        let mut subscribers = self.subscribers.write().await;
        Arc::clone(subscribers.entry(subscriber.clone()).or_default())
    }

    /// Add `repo` to the subscriber's set with an unseen watermark.
    ///
    /// Returns `false` (and leaves the existing watermark untouched) when the
    /// repository was already registered.
    pub async fn register(&self, subscriber: &SubscriberId, repo: RepoAddress) -> bool {
        let entry = self.entry_or_insert(subscriber).await;
        let mut repos = entry.lock().await;
        if repos.contains_key(&repo) {
            debug!(subscriber = %subscriber, repo = %repo, "repository already registered");
            return false;
        }
        debug!(subscriber = %subscriber, repo = %repo, "repository registered");
        repos.insert(repo, Watermark::Unseen);
        true
    }

    /// Repositories of `subscriber` in registration order; empty if unknown.
    pub async fn list(&self, subscriber: &SubscriberId) -> Vec<RepoAddress> {
        match self.entry(subscriber).await {
            Some(entry) => entry.lock().await.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Current watermark, or `None` if the pair is not registered.
    pub async fn watermark(&self, subscriber: &SubscriberId, repo: &RepoAddress) -> Option<Watermark> {
        let entry = self.entry(subscriber).await?;
        let repos = entry.lock().await;
        repos.get(repo).copied()
    }

    /// Move the watermark forward to `timestamp`.
    ///
    /// Applies only if the pair is registered and the watermark is unseen or
    /// strictly older than `timestamp`; stale or repeated advances are
    /// ignored. Returns whether the watermark changed.
    pub async fn advance_watermark(
        &self,
        subscriber: &SubscriberId,
        repo: &RepoAddress,
        timestamp: DateTime<Utc>,
    ) -> bool {
        let Some(entry) = self.entry(subscriber).await else {
            return false;
        };
        let mut repos = entry.lock().await;
        let Some(current) = repos.get_mut(repo) else {
            return false;
        };

        let advance = match *current {
            Watermark::Unseen => true,
            Watermark::Seen(at) => timestamp > at,
        };
        if advance {
            debug!(subscriber = %subscriber, repo = %repo, from = %current, to = %timestamp, "watermark advanced");
            *current = Watermark::Seen(timestamp);
        }
        advance
    }

    pub async fn has_repositories(&self, subscriber: &SubscriberId) -> bool {
        match self.entry(subscriber).await {
            Some(entry) => !entry.lock().await.is_empty(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn repo(name: &str) -> RepoAddress {
        RepoAddress::parse(&format!("svn://host/{name}")).unwrap()
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let s = SubscriberId::from(1_i64);

        assert!(registry.register(&s, repo("a")).await);
        assert!(!registry.register(&s, repo("a")).await);
        assert_eq!(registry.list(&s).await, vec![repo("a")]);
    }

    #[tokio::test]
    async fn register_does_not_reset_advanced_watermark() {
        let registry = SubscriptionRegistry::new();
        let s = SubscriberId::from(1_i64);
        registry.register(&s, repo("a")).await;
        registry.advance_watermark(&s, &repo("a"), at(100)).await;

        registry.register(&s, repo("a")).await;
        assert_eq!(registry.watermark(&s, &repo("a")).await, Some(Watermark::Seen(at(100))));
    }

    #[tokio::test]
    async fn list_preserves_registration_order() {
        let registry = SubscriptionRegistry::new();
        let s = SubscriberId::from(1_i64);
        for name in ["zeta", "alpha", "mid"] {
            registry.register(&s, repo(name)).await;
        }
        assert_eq!(registry.list(&s).await, vec![repo("zeta"), repo("alpha"), repo("mid")]);
    }

    #[tokio::test]
    async fn unknown_subscriber_is_empty() {
        let registry = SubscriptionRegistry::new();
        let s = SubscriberId::from(9_i64);
        assert!(registry.list(&s).await.is_empty());
        assert!(!registry.has_repositories(&s).await);
        assert_eq!(registry.watermark(&s, &repo("a")).await, None);
        assert!(!registry.advance_watermark(&s, &repo("a"), at(1)).await);
    }

    #[tokio::test]
    async fn advance_is_monotonic() {
        let registry = SubscriptionRegistry::new();
        let s = SubscriberId::from(1_i64);
        let r = repo("a");
        registry.register(&s, r.clone()).await;

        assert_eq!(registry.watermark(&s, &r).await, Some(Watermark::Unseen));
        assert!(registry.advance_watermark(&s, &r, at(50)).await);
        assert!(!registry.advance_watermark(&s, &r, at(50)).await);
        assert!(!registry.advance_watermark(&s, &r, at(10)).await);
        assert_eq!(registry.watermark(&s, &r).await, Some(Watermark::Seen(at(50))));
        assert!(registry.advance_watermark(&s, &r, at(51)).await);
        assert_eq!(registry.watermark(&s, &r).await, Some(Watermark::Seen(at(51))));
    }

    #[tokio::test]
    async fn monotonic_under_arbitrary_advance_sequence() {
        let registry = SubscriptionRegistry::new();
        let s = SubscriberId::from(1_i64);
        let r = repo("a");
        registry.register(&s, r.clone()).await;

        let mut previous = None;
        for secs in [30, 5, 90, 90, 12, 200, 199, 3, 201] {
            registry.advance_watermark(&s, &r, at(secs)).await;
            let current = registry.watermark(&s, &r).await.and_then(Watermark::timestamp);
            assert!(current >= previous, "watermark went backwards at {secs}");
            previous = current;
        }
        assert_eq!(previous, Some(at(201)));
    }

    #[tokio::test]
    async fn subscribers_are_independent() {
        let registry = SubscriptionRegistry::new();
        let a = SubscriberId::from(1_i64);
        let b = SubscriberId::from(2_i64);
        registry.register(&a, repo("shared")).await;
        registry.register(&b, repo("shared")).await;

        registry.advance_watermark(&a, &repo("shared"), at(10)).await;
        assert_eq!(registry.watermark(&b, &repo("shared")).await, Some(Watermark::Unseen));
        assert_eq!(registry.list(&b).await, vec![repo("shared")]);
    }

    #[tokio::test]
    async fn concurrent_registrations_keep_one_entry_each() {
        let registry = SubscriptionRegistry::shared();
        let s = SubscriberId::from(1_i64);

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = Arc::clone(&registry);
            let s = s.clone();
            handles.push(tokio::spawn(async move {
                registry.register(&s, repo(&format!("r{}", i % 4))).await
            }));
        }
        let mut added = 0;
        for handle in handles {
            if handle.await.unwrap() {
                added += 1;
            }
        }
        assert_eq!(added, 4);
        assert_eq!(registry.list(&s).await.len(), 4);
    }
}
