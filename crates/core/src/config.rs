use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, WatchError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| WatchError::InvalidConfig(format!("{key}: cannot parse '{raw}'"))),
        None => Ok(default),
    }
}

// ── Advance policy ────────────────────────────────────────────

/// When a poll tick moves the watermark forward.
///
/// Both variants only ever advance to a change whose delivery was confirmed,
/// so no change is skipped. They differ in how much is re-sent after a tick
/// that stopped half way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvancePolicy {
    /// Advance once per repository per tick, to the timestamp of the first
    /// change delivered in that tick. Later changes of the same batch stay
    /// above the watermark and are delivered again on the next tick.
    #[default]
    FirstDelivered,
    /// Advance after every confirmed delivery.
    EachDelivered,
}

impl FromStr for AdvancePolicy {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first_delivered" => Ok(Self::FirstDelivered),
            "each" | "each_delivered" => Ok(Self::EachDelivered),
            other => Err(WatchError::InvalidConfig(format!(
                "unknown advance policy '{other}' (expected 'first' or 'each')"
            ))),
        }
    }
}

// ── Watch config ──────────────────────────────────────────────

/// Longest accepted interval, delay or timeout (one year).
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Process-wide polling settings, static for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Delay between two recurring ticks of one subscriber.
    pub poll_interval: Duration,
    /// Maximum number of changes requested per repository per tick.
    pub fetch_limit: usize,
    /// How many historical changes are replayed on first contact.
    /// Zero disables the one-shot replay job.
    pub startup_replay_count: usize,
    /// Delay before the one-shot replay tick fires.
    pub startup_delay: Duration,
    /// Upper bound for one change-source call.
    pub fetch_timeout: Duration,
    pub advance_policy: AdvancePolicy,
    /// Path or name of the `svn` executable.
    pub svn_binary: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(900),
            fetch_limit: 10,
            startup_replay_count: 1,
            startup_delay: Duration::from_secs(3),
            fetch_timeout: Duration::from_secs(60),
            advance_policy: AdvancePolicy::FirstDelivered,
            svn_binary: "svn".to_string(),
        }
    }
}

impl WatchConfig {
    /// Build config from `REPOWATCH_*` environment variables
    /// (call [`load_dotenv`] first). Missing keys fall back to defaults.
    pub fn from_env() -> Result<Self, WatchError> {
        Self::from_lookup(env_opt)
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WatchError> {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| -> Result<Duration, WatchError> {
            parse_or(&lookup, key, default.as_secs()).map(Duration::from_secs)
        };

        let config = Self {
            poll_interval: secs("REPOWATCH_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            fetch_limit: parse_or(&lookup, "REPOWATCH_FETCH_LIMIT", defaults.fetch_limit)?,
            startup_replay_count: parse_or(
                &lookup,
                "REPOWATCH_STARTUP_REPLAY_COUNT",
                defaults.startup_replay_count,
            )?,
            startup_delay: secs("REPOWATCH_STARTUP_DELAY_SECS", defaults.startup_delay)?,
            fetch_timeout: secs("REPOWATCH_FETCH_TIMEOUT_SECS", defaults.fetch_timeout)?,
            advance_policy: parse_or(&lookup, "REPOWATCH_ADVANCE_POLICY", defaults.advance_policy)?,
            svn_binary: lookup("REPOWATCH_SVN_BIN").unwrap_or(defaults.svn_binary),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings polling cannot run with.
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.poll_interval.is_zero() {
            return Err(WatchError::InvalidConfig("poll interval must be positive".into()));
        }
        if self.fetch_limit == 0 {
            return Err(WatchError::InvalidConfig("fetch limit must be positive".into()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(WatchError::InvalidConfig("fetch timeout must be positive".into()));
        }
        for (name, value) in [
            ("poll interval", self.poll_interval),
            ("startup delay", self.startup_delay),
            ("fetch timeout", self.fetch_timeout),
        ] {
            if value > MAX_DURATION {
                return Err(WatchError::InvalidConfig(format!(
                    "{name} must not exceed {} seconds",
                    MAX_DURATION.as_secs()
                )));
            }
        }
        if self.svn_binary.trim().is_empty() {
            return Err(WatchError::InvalidConfig("svn binary must not be empty".into()));
        }
        Ok(())
    }

    /// Whether the one-shot replay job is scheduled on activation.
    pub fn replay_enabled(&self) -> bool {
        self.startup_replay_count > 0
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Watch config loaded:");
        tracing::info!("  poll:     interval={:?}, limit={}", self.poll_interval, self.fetch_limit);
        tracing::info!(
            "  replay:   count={}, delay={:?}",
            self.startup_replay_count,
            self.startup_delay
        );
        tracing::info!(
            "  fetch:    timeout={:?}, svn={}",
            self.fetch_timeout,
            self.svn_binary
        );
        tracing::info!("  advance:  {:?}", self.advance_policy);
    }
}
