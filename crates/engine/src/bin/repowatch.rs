//! repowatch: polls Subversion repositories and pushes new commits to chats.
//!
//! Notifications go to Telegram when a bot token is configured, to a webhook
//! when a URL is given, and to the log otherwise. Subscriptions come from
//! `--watch CHAT=REPO` flags and, with `--interactive`, from `<chat> <command>`
//! lines on stdin (`1234 /add svn://host/repo`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use repowatch_core::config::load_dotenv;
use repowatch_core::{AdvancePolicy, SubscriberId, WatchConfig};
use repowatch_engine::command::{self, Command};
use repowatch_engine::{SvnLogSource, WatchService};
use repowatch_notify::{
    MessageFormatter, Notification, Notifier, NotifyError, TelegramNotifier, WebhookNotifier,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Watch repositories and notify subscribers about new commits.
#[derive(Parser, Debug)]
#[command(name = "repowatch", version, about)]
struct Cli {
    /// Telegram bot token (`${VAR}` references are resolved).
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Webhook URL used when no Telegram token is set.
    #[arg(long, env = "REPOWATCH_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Static subscription, `CHAT=REPOSITORY`. Repeatable.
    #[arg(long = "watch", env = "REPOWATCH_WATCH", value_delimiter = ',', value_parser = parse_watch)]
    watches: Vec<(SubscriberId, String)>,

    /// Read `<chat> <command>` lines from stdin.
    #[arg(long)]
    interactive: bool,

    /// Override the poll interval in seconds.
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Override the per-repository fetch limit.
    #[arg(long)]
    fetch_limit: Option<usize>,

    /// Override the number of changes replayed on first contact.
    #[arg(long)]
    replay_count: Option<usize>,

    /// Override the watermark advance policy (`first` or `each`).
    #[arg(long)]
    advance_policy: Option<AdvancePolicy>,

    /// minijinja template file for notification bodies.
    #[arg(long, env = "REPOWATCH_TEMPLATE")]
    template: Option<String>,

    /// strftime format for commit timestamps.
    #[arg(long, env = "REPOWATCH_TIMESTAMP_FORMAT")]
    timestamp_format: Option<String>,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "REPOWATCH_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,
}

fn parse_watch(raw: &str) -> Result<(SubscriberId, String), String> {
    let (chat, repo) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CHAT=REPOSITORY, got '{raw}'"))?;
    let chat = chat.trim();
    if chat.is_empty() {
        return Err(format!("missing chat id in '{raw}'"));
    }
    Ok((SubscriberId::from(chat), repo.trim().to_string()))
}

impl Cli {
    fn apply_overrides(&self, config: &mut WatchConfig) {
        if let Some(secs) = self.poll_interval {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(limit) = self.fetch_limit {
            config.fetch_limit = limit;
        }
        if let Some(count) = self.replay_count {
            config.startup_replay_count = count;
        }
        if let Some(policy) = self.advance_policy {
            config.advance_policy = policy;
        }
    }

    fn formatter(&self) -> anyhow::Result<MessageFormatter> {
        let mut formatter = match &self.template {
            Some(path) => {
                let template = std::fs::read_to_string(path)
                    .with_context(|| format!("reading template {path}"))?;
                MessageFormatter::new(template)?
            }
            None => MessageFormatter::default(),
        };
        if let Some(format) = &self.timestamp_format {
            formatter = formatter.with_timestamp_format(format.clone())?;
        }
        Ok(formatter)
    }

    fn notifier(&self) -> anyhow::Result<Arc<dyn Notifier>> {
        if let Some(token) = &self.telegram_token {
            let notifier = TelegramNotifier::from_config(token.clone(), Some("HTML".to_string()))?;
            return Ok(Arc::new(notifier));
        }
        if let Some(url) = &self.webhook_url {
            let notifier = WebhookNotifier::new(url, None, Default::default())?;
            return Ok(Arc::new(notifier));
        }
        warn!("no Telegram token or webhook URL configured, notifications go to the log");
        Ok(Arc::new(LogNotifier))
    }
}

// ── LogNotifier ─────────────────────────────────────────────────────

struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(recipient = %notification.recipient, body = %notification.body, "notification");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}

// ── stdin commands ──────────────────────────────────────────────────

async fn run_interactive(service: &WatchService) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some((chat, text)) = line.trim().split_once(char::is_whitespace) else {
            continue;
        };
        let subscriber = SubscriberId::from(chat);
        match Command::parse(text) {
            Some(cmd) => {
                if let Some(reply) = command::handle(service, &subscriber, cmd).await {
                    println!("[{subscriber}] {}", reply.trim_end());
                }
            }
            None => warn!(subscriber = %subscriber, text, "not a command"),
        }
    }
    info!("stdin closed");
    Ok(())
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = WatchConfig::from_env()?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    config.log_summary();

    let source = Arc::new(SvnLogSource::new(config.svn_binary.clone()));
    let service = WatchService::new(&config, source, cli.notifier()?, cli.formatter()?);

    for (subscriber, repo) in &cli.watches {
        match service.add(subscriber, repo).await {
            Ok(outcome) => info!(
                subscriber = %subscriber,
                repo = %outcome.repo,
                activation = ?outcome.activation,
                "static subscription"
            ),
            Err(e) => warn!(subscriber = %subscriber, error = %e, "skipping --watch entry"),
        }
    }

    info!("repowatch running");
    let interrupted = if cli.interactive {
        tokio::select! {
            result = run_interactive(&service) => {
                result?;
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        }
    } else {
        false
    };

    if !interrupted {
        if service.scheduler().active_count().await == 0 {
            info!("nothing to watch, exiting");
        } else {
            tokio::signal::ctrl_c().await?;
        }
    }
    info!("shutting down");

    service.shutdown(Duration::from_secs(cli.shutdown_timeout)).await;
    info!("repowatch exited cleanly");
    Ok(())
}
