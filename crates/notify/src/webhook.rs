//! Generic HTTP webhook notifier.
//!
//! Posts each notification as JSON to a configured URL, for bridging to chat
//! systems other than Telegram:
//!
//! ```json
//! {"recipient": "1234", "text": "...", "label": "New", "revision": "42",
//!  "repository": "svn://host/repo"}
//! ```

use std::collections::HashMap;

use serde::Serialize;

use crate::env::resolve_env_vars;
use crate::traits::{Notification, Notifier, NotifyError};

#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    method: reqwest::Method,
    /// Extra headers sent on every request (auth tokens and the like).
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a str,
    text: &'a str,
    #[serde(flatten)]
    metadata: &'a HashMap<String, String>,
}

impl<'a> From<&'a Notification> for WebhookPayload<'a> {
    fn from(notification: &'a Notification) -> Self {
        Self {
            recipient: notification.recipient.as_str(),
            text: &notification.body,
            metadata: &notification.metadata,
        }
    }
}

impl WebhookNotifier {
    /// `method` defaults to `POST`. `${VAR}` references in the URL and in
    /// header values are expanded once, here.
    pub fn new(
        url: &str,
        method: Option<&str>,
        headers: HashMap<String, String>,
    ) -> Result<Self, NotifyError> {
        let method = match method {
            Some(m) => m
                .to_uppercase()
                .parse::<reqwest::Method>()
                .map_err(|_| NotifyError::Config(format!("invalid HTTP method: {m}")))?,
            None => reqwest::Method::POST,
        };

        let headers = headers
            .into_iter()
            .map(|(name, value)| Ok((name, resolve_env_vars(&value)?)))
            .collect::<Result<HashMap<_, _>, NotifyError>>()?;

        Ok(Self {
            url: resolve_env_vars(url)?,
            method,
            headers,
            client: reqwest::Client::new(),
        })
    }
}

/// Seconds from a `Retry-After` header, when it holds a plain number.
fn retry_after(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(30)
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let request = self.headers.iter().fold(
            self.client
                .request(self.method.clone(), &self.url)
                .json(&WebhookPayload::from(notification)),
            |request, (name, value)| request.header(name.as_str(), value.as_str()),
        );

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(NotifyError::RateLimited {
                retry_after_secs: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(url = %self.url, %status, body = %body, "webhook refused notification");
            return Err(NotifyError::Rejected(format!("webhook returned {status}: {body}")));
        }

        tracing::debug!(recipient = %notification.recipient, %status, "webhook notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}
