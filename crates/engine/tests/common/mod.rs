//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

use repowatch_core::{
    AdvancePolicy, ChangeRecord, RepoAddress, Revision, SubscriberId, WatchConfig, Watermark,
};
use repowatch_engine::{
    ChangeSource, PollContext, PollJob, PollSettings, SharedRegistry, SourceError,
    SubscriptionRegistry,
};
use repowatch_notify::{MessageFormatter, Notification, Notifier, NotifyError};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_500_000_000 + secs, 0).unwrap()
}

pub fn repo(name: &str) -> RepoAddress {
    RepoAddress::parse(&format!("svn://svn.example.org/{name}")).unwrap()
}

pub fn subscriber(id: i64) -> SubscriberId {
    SubscriberId::from(id)
}

/// Change `rev` of `repo` committed at `at(rev * 10)`.
pub fn change(repo: &RepoAddress, rev: u64) -> ChangeRecord {
    ChangeRecord {
        revision: Revision::new(rev),
        timestamp: at(rev as i64 * 10),
        author: "alice".to_string(),
        message: format!("commit {rev}"),
        repository: repo.clone(),
    }
}

/// Per-repository commit history served the way `svn log` would: newest
/// first without a watermark, oldest first from the watermark's revision
/// (inclusive) otherwise.
#[derive(Default)]
pub struct ScriptedSource {
    history: Mutex<HashMap<RepoAddress, Vec<ChangeRecord>>>,
    failing: Mutex<HashSet<RepoAddress>>,
    stalled: Mutex<HashSet<RepoAddress>>,
    delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    /// Highest number of fetches seen running at once.
    pub max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub async fn push(&self, record: ChangeRecord) {
        self.history
            .lock()
            .await
            .entry(record.repository.clone())
            .or_default()
            .push(record);
    }

    pub async fn push_all(&self, repo: &RepoAddress, revisions: impl IntoIterator<Item = u64>) {
        for rev in revisions {
            self.push(change(repo, rev)).await;
        }
    }

    pub async fn fail(&self, repo: &RepoAddress, failing: bool) {
        let mut set = self.failing.lock().await;
        if failing {
            set.insert(repo.clone());
        } else {
            set.remove(repo);
        }
    }

    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().await = delay;
    }

    /// Make fetches of `repo` hang far past any test timeout.
    pub async fn stall(&self, repo: &RepoAddress) {
        self.stalled.lock().await.insert(repo.clone());
    }

    async fn fetch(
        &self,
        repo: &RepoAddress,
        watermark: Watermark,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>, SourceError> {
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.stalled.lock().await.contains(repo) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.lock().await.contains(repo) {
            return Err(SourceError::Other(format!("{repo} unreachable")));
        }

        let mut records = self.history.lock().await.get(repo).cloned().unwrap_or_default();
        records.sort_by(ChangeRecord::chronological);
        Ok(match watermark {
            Watermark::Unseen => records.into_iter().rev().take(limit).collect(),
            Watermark::Seen(w) => records
                .into_iter()
                .filter(|r| r.timestamp >= w)
                .take(limit)
                .collect(),
        })
    }
}

/// Decrements the in-flight counter even when the fetch is dropped on timeout.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChangeSource for ScriptedSource {
    async fn fetch_since(
        &self,
        repo: &RepoAddress,
        watermark: Watermark,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        self.fetch(repo, watermark, limit).await
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Records every confirmed notification. Can be told to reject one attempt.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
    attempts: AtomicUsize,
    /// 1-based attempt number to reject; 0 disables.
    reject_attempt: AtomicUsize,
}

impl RecordingNotifier {
    pub fn reject_attempt(&self, attempt: usize) {
        self.attempts.store(0, Ordering::SeqCst);
        self.reject_attempt.store(attempt, Ordering::SeqCst);
    }

    /// `(label, revision, recipient)` of everything delivered so far.
    pub async fn deliveries(&self) -> Vec<(String, u64, String)> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|n| {
                (
                    n.metadata["label"].clone(),
                    n.metadata["revision"].parse().unwrap(),
                    n.recipient.to_string(),
                )
            })
            .collect()
    }

    pub async fn revisions_for(&self, subscriber: &SubscriberId) -> Vec<u64> {
        self.deliveries()
            .await
            .into_iter()
            .filter(|(_, _, to)| to == subscriber.as_str())
            .map(|(_, rev, _)| rev)
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == self.reject_attempt.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected("chat not found".to_string()));
        }
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

pub struct Fixture {
    pub registry: SharedRegistry,
    pub source: Arc<ScriptedSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub context: Arc<PollContext>,
}

impl Fixture {
    pub fn new(policy: AdvancePolicy) -> Self {
        Self::with_settings(PollSettings {
            fetch_limit: 10,
            replay_count: 1,
            fetch_timeout: Duration::from_secs(5),
            advance_policy: policy,
        })
    }

    pub fn with_settings(settings: PollSettings) -> Self {
        let registry = SubscriptionRegistry::shared();
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let context = Arc::new(PollContext {
            registry: Arc::clone(&registry),
            source: source.clone(),
            notifier: notifier.clone(),
            formatter: MessageFormatter::default(),
            settings,
        });
        Self {
            registry,
            source,
            notifier,
            context,
        }
    }

    pub fn job(&self, subscriber: &SubscriberId) -> PollJob {
        PollJob::new(subscriber.clone(), Arc::clone(&self.context))
    }

    pub async fn watermark(&self, subscriber: &SubscriberId, repo: &RepoAddress) -> Option<Watermark> {
        self.registry.watermark(subscriber, repo).await
    }
}

/// Config with millisecond timings for scheduler-driven tests.
pub fn fast_config() -> WatchConfig {
    WatchConfig {
        poll_interval: Duration::from_millis(40),
        startup_delay: Duration::from_millis(5),
        fetch_timeout: Duration::from_secs(1),
        ..WatchConfig::default()
    }
}
