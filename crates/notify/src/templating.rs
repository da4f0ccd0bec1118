//! Minijinja rendering of change notifications.
//!
//! One [`ChangeContext`] is built per delivered change and rendered through
//! the formatter's template. The default template produces Telegram HTML
//! with every mandatory field: label, revision, timestamp, author, message
//! and repository.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

use repowatch_core::{ChangeRecord, NoticeLabel, SubscriberId};

use crate::traits::{Notification, NotifyError};

/// Default message layout (Telegram `HTML` parse mode).
pub const DEFAULT_TEMPLATE: &str = "<strong>{{ label }} commit</strong> ({{ revision }})   \
{{ timestamp }}   <b>{{ author | html }}</b>\n\n\
<i>{{ message | html }}</i>\n\n\
Repository: {{ repository | html }}";

/// Locale-style timestamp format (`strftime` `%c`).
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%c";

/// Context data available to notification templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChangeContext {
    /// `"Last"` for replayed history, `"New"` otherwise.
    pub label: String,
    pub revision: u64,
    /// Timestamp rendered with the formatter's timestamp format.
    pub timestamp: String,
    /// Timestamp in RFC 3339.
    pub timestamp_iso: String,
    pub author: String,
    pub message: String,
    pub repository: String,
}

impl ChangeContext {
    pub fn new(
        label: NoticeLabel,
        record: &ChangeRecord,
        timestamp_format: &str,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            label: label.to_string(),
            revision: record.revision.as_u64(),
            timestamp: format_timestamp(record.timestamp, timestamp_format)?,
            timestamp_iso: record.timestamp.to_rfc3339(),
            author: record.author.clone(),
            message: record.message.clone(),
            repository: record.repository.to_string(),
        })
    }
}

/// `strftime` rendering that reports bad specifiers instead of panicking
/// inside `to_string`.
fn format_timestamp(timestamp: DateTime<Utc>, format: &str) -> Result<String, NotifyError> {
    let mut rendered = String::new();
    write!(rendered, "{}", timestamp.format(format))
        .map_err(|_| NotifyError::Template(format!("invalid timestamp format '{format}'")))?;
    Ok(rendered)
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(ch),
        }
    }
    result
}

/// Renders change records into notification text.
///
/// The template is validated once at construction; rendering builds a fresh
/// [`minijinja::Environment`] per call since the template is a plain string.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    template: String,
    timestamp_format: String,
}

impl MessageFormatter {
    /// Create a formatter from a template string.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the template has syntax errors.
    pub fn new(template: impl Into<String>) -> Result<Self, NotifyError> {
        let template = template.into();
        Self::build_env()
            .template_from_str(&template)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(Self {
            template,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        })
    }

    /// Override the `strftime` format used for `{{ timestamp }}`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if the format has an unknown or
    /// incomplete specifier.
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Result<Self, NotifyError> {
        let format = format.into();
        if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
            return Err(NotifyError::Template(format!(
                "invalid timestamp format '{format}'"
            )));
        }
        self.timestamp_format = format;
        Ok(self)
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("html", html_filter);
        env
    }

    /// Render one change record.
    pub fn render(&self, label: NoticeLabel, record: &ChangeRecord) -> Result<String, NotifyError> {
        let ctx = ChangeContext::new(label, record, &self.timestamp_format)?;
        Self::build_env()
            .render_str(&self.template, &ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Render one change record into a [`Notification`] for `recipient`.
    pub fn notification(
        &self,
        recipient: &SubscriberId,
        label: NoticeLabel,
        record: &ChangeRecord,
    ) -> Result<Notification, NotifyError> {
        let body = self.render(label, record)?;
        Ok(Notification {
            recipient: recipient.clone(),
            body,
            metadata: HashMap::from([
                ("label".to_string(), label.to_string()),
                ("revision".to_string(), record.revision.to_string()),
                ("repository".to_string(), record.repository.to_string()),
            ]),
        })
    }
}

impl Default for MessageFormatter {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

fn html_filter(value: String) -> String {
    escape_html(&value)
}
