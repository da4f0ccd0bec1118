//! Change source adapters.
//!
//! A [`ChangeSource`] answers "which changes happened in this repository after
//! watermark W", bounded by a limit. The poll job does not trust the order of
//! the returned records and re-sorts them itself.

mod svn;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use repowatch_core::{ChangeRecord, RepoAddress, Watermark};

pub use self::svn::{parse_svn_log, SvnLogSource};

/// Errors a change source may report. All of them are transient from the
/// poll job's point of view: the repository is skipped for one tick.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("cannot parse change log: {0}")]
    Parse(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// Trait for change log backends.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Fetch at most `limit` changes of `repo`.
    ///
    /// With [`Watermark::Unseen`] the most recent `limit` changes are
    /// returned; otherwise changes from around the watermark onwards.
    /// Records at or before the watermark may be included and are filtered
    /// by the caller.
    async fn fetch_since(
        &self,
        repo: &RepoAddress,
        watermark: Watermark,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>, SourceError>;

    /// Human-readable backend name (used in logs).
    fn name(&self) -> &str;
}
