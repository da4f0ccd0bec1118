//! Telegram Bot API notifier.
//!
//! Each notification becomes one `sendMessage` call whose `chat_id` is the
//! notification's recipient, so a single notifier serves every subscriber.

use serde::{Deserialize, Serialize};

use crate::env::resolve_env_vars;
use crate::traits::{Notification, Notifier, NotifyError};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Fallback wait when a 429 carries no `retry_after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

#[derive(Debug)]
pub struct TelegramNotifier {
    bot_token: String,
    parse_mode: Option<String>,
    api_base: String,
    client: reqwest::Client,
}

/// `sendMessage` request body.
#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

impl TelegramNotifier {
    /// Build a notifier for `bot_token`.
    ///
    /// `${VAR}` references in the token are expanded from the environment.
    /// Fails with [`NotifyError::Config`] on an empty token or a missing var.
    pub fn from_config(bot_token: String, parse_mode: Option<String>) -> Result<Self, NotifyError> {
        let bot_token = resolve_env_vars(&bot_token)?;
        if bot_token.trim().is_empty() {
            return Err(NotifyError::Config(
                "Telegram bot token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            bot_token,
            parse_mode,
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        })
    }

    /// Point the notifier at a different Bot API server (self-hosted or test).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }

    fn request<'a>(&'a self, notification: &'a Notification) -> SendMessage<'a> {
        SendMessage {
            chat_id: notification.recipient.as_str(),
            text: &notification.body,
            parse_mode: self.parse_mode.as_deref(),
            disable_web_page_preview: true,
        }
    }
}

/// Map an unsuccessful Bot API answer to a delivery error.
fn rejection(status: reqwest::StatusCode, response: ApiResponse) -> NotifyError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .parameters
            .and_then(|p| p.retry_after)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return NotifyError::RateLimited { retry_after_secs };
    }
    let description = response
        .description
        .unwrap_or_else(|| format!("HTTP {status}"));
    NotifyError::Rejected(format!("Telegram API error: {description}"))
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let chat_id = notification.recipient.as_str();
        tracing::debug!(chat_id, parse_mode = ?self.parse_mode, "sending Telegram message");

        let response = self
            .client
            .post(self.send_message_url())
            .json(&self.request(notification))
            .send()
            .await?;

        let status = response.status();
        let body: ApiResponse = response.json().await?;
        if body.ok {
            tracing::debug!(chat_id, "Telegram message sent");
            return Ok(());
        }
        Err(rejection(status, body))
    }

    fn channel_name(&self) -> &str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repowatch_core::SubscriberId;

    #[test]
    fn token_reference_is_expanded() {
        std::env::set_var("TEST_REPOWATCH_TG_TOKEN", "123:ABC");
        let notifier =
            TelegramNotifier::from_config("${TEST_REPOWATCH_TG_TOKEN}".to_string(), None)
                .expect("should resolve env var");
        assert_eq!(notifier.bot_token, "123:ABC");
    }

    #[test]
    fn missing_token_var_is_a_config_error() {
        let result =
            TelegramNotifier::from_config("${NONEXISTENT_VAR_REPOWATCH_XYZ}".to_string(), None);
        assert!(matches!(result, Err(NotifyError::Config(msg)) if msg.contains("NONEXISTENT_VAR_REPOWATCH_XYZ")));
    }

    #[test]
    fn empty_token_rejected() {
        let err = TelegramNotifier::from_config("  ".to_string(), None).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn request_targets_recipient_chat() {
        let notifier =
            TelegramNotifier::from_config("123456:ABC-DEF".to_string(), Some("HTML".to_string()))
                .unwrap();
        let n = Notification::new(SubscriberId::from(-100123_i64), "<b>hi</b>");
        let body = serde_json::to_value(notifier.request(&n)).unwrap();
        assert_eq!(body["chat_id"], "-100123");
        assert_eq!(body["text"], "<b>hi</b>");
        assert_eq!(body["parse_mode"], "HTML");
        assert_eq!(body["disable_web_page_preview"], true);
    }

    #[test]
    fn parse_mode_omitted_when_unset() {
        let notifier = TelegramNotifier::from_config("t".to_string(), None).unwrap();
        let n = Notification::new(SubscriberId::new("1"), "x");
        let body = serde_json::to_value(notifier.request(&n)).unwrap();
        assert!(body.get("parse_mode").is_none());
    }

    #[test]
    fn api_base_override() {
        let notifier = TelegramNotifier::from_config("tok".to_string(), None)
            .unwrap()
            .with_api_base("http://localhost:8081/");
        assert_eq!(notifier.send_message_url(), "http://localhost:8081/bottok/sendMessage");
        assert_eq!(notifier.channel_name(), "telegram");
    }

    #[test]
    fn rate_limit_uses_retry_after() {
        let response: ApiResponse = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":7}}"#,
        )
        .unwrap();
        let err = rejection(reqwest::StatusCode::TOO_MANY_REQUESTS, response);
        assert!(matches!(err, NotifyError::RateLimited { retry_after_secs: 7 }));
    }

    #[test]
    fn other_failures_carry_description() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
                .unwrap();
        let err = rejection(reqwest::StatusCode::BAD_REQUEST, response);
        assert!(matches!(err, NotifyError::Rejected(msg) if msg.contains("chat not found")));
    }
}
