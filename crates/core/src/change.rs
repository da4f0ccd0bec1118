//! Change records and the per-repository watermark.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RepoAddress, Revision};

/// One change (commit) reported by a change source. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub revision: Revision,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub message: String,
    /// Repository the change was fetched from.
    pub repository: RepoAddress,
}

impl ChangeRecord {
    /// Ordering key: timestamp first, revision breaks ties.
    pub fn order_key(&self) -> (DateTime<Utc>, Revision) {
        (self.timestamp, self.revision)
    }

    /// Compare two records by [`order_key`](Self::order_key).
    pub fn chronological(a: &Self, b: &Self) -> Ordering {
        a.order_key().cmp(&b.order_key())
    }
}

/// Boundary at or below which every change of a (subscriber, repository)
/// pair has already been notified.
///
/// `Unseen` is distinct from every real timestamp: it selects the capped
/// replay of recent history instead of "everything after T".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "at", rename_all = "snake_case")]
pub enum Watermark {
    #[default]
    Unseen,
    Seen(DateTime<Utc>),
}

impl Watermark {
    pub fn is_unseen(self) -> bool {
        matches!(self, Watermark::Unseen)
    }

    pub fn timestamp(self) -> Option<DateTime<Utc>> {
        match self {
            Watermark::Unseen => None,
            Watermark::Seen(at) => Some(at),
        }
    }

    /// Whether a change at `timestamp` has not been notified yet.
    pub fn admits(self, timestamp: DateTime<Utc>) -> bool {
        match self {
            Watermark::Unseen => true,
            Watermark::Seen(at) => timestamp > at,
        }
    }

    /// Label used when announcing changes admitted by this watermark.
    pub fn label(self) -> NoticeLabel {
        match self {
            Watermark::Unseen => NoticeLabel::Last,
            Watermark::Seen(_) => NoticeLabel::New,
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watermark::Unseen => f.write_str("unseen"),
            Watermark::Seen(at) => write!(f, "{}", at.to_rfc3339()),
        }
    }
}

/// Adjective shown in front of a delivered change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoticeLabel {
    /// Historical change replayed on first contact with a repository.
    Last,
    /// Change that appeared after the watermark.
    New,
}

impl NoticeLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            NoticeLabel::Last => "Last",
            NoticeLabel::New => "New",
        }
    }
}

impl fmt::Display for NoticeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(rev: u64, secs: i64) -> ChangeRecord {
        ChangeRecord {
            revision: Revision::new(rev),
            timestamp: at(secs),
            author: "alice".to_string(),
            message: "msg".to_string(),
            repository: RepoAddress::parse("svn://host/repo").unwrap(),
        }
    }

    #[test]
    fn unseen_admits_everything() {
        assert!(Watermark::Unseen.admits(at(0)));
        assert_eq!(Watermark::Unseen.label(), NoticeLabel::Last);
    }

    #[test]
    fn seen_admits_only_strictly_newer() {
        let wm = Watermark::Seen(at(100));
        assert!(!wm.admits(at(99)));
        assert!(!wm.admits(at(100)));
        assert!(wm.admits(at(101)));
        assert_eq!(wm.label(), NoticeLabel::New);
    }

    #[test]
    fn chronological_breaks_ties_by_revision() {
        let mut records = vec![record(7, 50), record(3, 50), record(1, 10)];
        records.sort_by(ChangeRecord::chronological);
        let revs: Vec<u64> = records.iter().map(|r| r.revision.as_u64()).collect();
        assert_eq!(revs, vec![1, 3, 7]);
    }

    #[test]
    fn watermark_serializes_tagged() {
        let json = serde_json::to_value(Watermark::Unseen).unwrap();
        assert_eq!(json["state"], "unseen");
        let json = serde_json::to_value(Watermark::Seen(at(0))).unwrap();
        assert_eq!(json["state"], "seen");
    }
}
