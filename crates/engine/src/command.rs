//! Chat-style text commands: `/start`, `/add <repository>`, `/list`.
//!
//! Parsing and reply texts only; receiving and sending messages belongs to
//! the transport.

use std::fmt::Write as _;

use repowatch_core::SubscriberId;
use tracing::debug;

use crate::service::{Listing, WatchService};

pub const ADD_USAGE: &str = "Usage: /add <repository>";
pub const NO_REPOSITORIES: &str = "There are not any repositories registered.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    /// `None` when the argument was missing.
    Add(Option<String>),
    List,
}

impl Command {
    /// Parse one message. Returns `None` for plain text and unknown commands.
    ///
    /// A `@botname` suffix on the command word is ignored, and extra
    /// arguments after the first are dropped.
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let word = words.next()?.strip_prefix('/')?;
        let name = word.split('@').next().unwrap_or(word);

        match name {
            "start" => Some(Command::Start),
            "add" => Some(Command::Add(words.next().map(str::to_string))),
            "list" => Some(Command::List),
            _ => None,
        }
    }
}

/// Execute `command` for `subscriber` and produce the reply, if any.
///
/// `/start` activates polling silently.
pub async fn handle(service: &WatchService, subscriber: &SubscriberId, command: Command) -> Option<String> {
    debug!(subscriber = %subscriber, ?command, "handling command");
    match command {
        Command::Start => {
            service.start(subscriber).await;
            None
        }
        Command::Add(None) => Some(ADD_USAGE.to_string()),
        Command::Add(Some(raw)) => match service.add(subscriber, &raw).await {
            Ok(outcome) => Some(format!("Repository <{}> has successfully added.", outcome.repo)),
            Err(e) => Some(e.to_string()),
        },
        Command::List => match service.list(subscriber).await {
            Listing::Empty => Some(NO_REPOSITORIES.to_string()),
            Listing::Repositories(repos) => {
                let mut reply = String::new();
                for (i, repo) in repos.iter().enumerate() {
                    let _ = writeln!(reply, "{}. {}", i + 1, repo);
                }
                Some(reply)
            }
        },
    }
}
