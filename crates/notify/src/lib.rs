//! Notification delivery for repository change alerts.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels (the sink the poll jobs write to)
//! - Telegram Bot API and generic webhook notifier implementations
//! - Minijinja rendering of one change record into message text

mod env;
pub mod telegram;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use telegram::TelegramNotifier;
pub use templating::MessageFormatter;
pub use traits::{Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
