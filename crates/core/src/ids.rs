//! Identifier newtypes: subscribers, repository addresses and revisions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WatchError;

/// URL schemes accepted for a repository address.
const SUPPORTED_SCHEMES: &[&str] = &["svn://", "svn+ssh://", "http://", "https://", "file://"];

/// Opaque identifier of one subscriber (one chat or conversation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for SubscriberId {
    fn from(chat_id: i64) -> Self {
        Self(chat_id.to_string())
    }
}

impl From<&str> for SubscriberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a change source endpoint, e.g. `svn://host/project/trunk`.
///
/// Construction goes through [`RepoAddress::parse`], so a user-supplied
/// address that cannot be polled is rejected when the subscription command
/// is issued rather than on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoAddress(String);

impl RepoAddress {
    /// Validate and wrap a raw address. Surrounding whitespace is trimmed.
    pub fn parse(raw: &str) -> Result<Self, WatchError> {
        let address = raw.trim();
        let invalid = |reason: &str| WatchError::InvalidRepository {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        if address.is_empty() {
            return Err(invalid("address is empty"));
        }
        if address.chars().any(char::is_whitespace) {
            return Err(invalid("address contains whitespace"));
        }

        let scheme = SUPPORTED_SCHEMES
            .iter()
            .find(|scheme| address.starts_with(*scheme))
            .ok_or_else(|| invalid("unsupported scheme"))?;

        if address.len() == scheme.len() {
            return Err(invalid("missing host or path"));
        }

        Ok(Self(address.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepoAddress {
    type Error = WatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepoAddress> for String {
    fn from(address: RepoAddress) -> Self {
        address.0
    }
}

impl fmt::Display for RepoAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sequence identifier of a change within its repository (SVN revision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Revision(u64);

impl Revision {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
