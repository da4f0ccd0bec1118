use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("Invalid repository address '{address}': {reason}")]
    InvalidRepository { address: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
