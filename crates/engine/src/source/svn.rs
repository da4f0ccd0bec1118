//! Subversion change source backed by the `svn` command-line client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::debug;

use repowatch_core::{ChangeRecord, RepoAddress, Revision, Watermark};

use super::{ChangeSource, SourceError};

/// Line printed by `svn log` between entries.
const SEPARATOR: &str =
    "------------------------------------------------------------------------";

/// Runs `svn log` against a remote repository and parses its text output.
#[derive(Debug, Clone)]
pub struct SvnLogSource {
    program: String,
}

impl SvnLogSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for one `svn log` call.
    ///
    /// Without a watermark svn lists newest-first from HEAD. With one, the
    /// range `{T}:HEAD` starts at the revision that was current at `T`, so
    /// the change at the watermark itself is normally included again.
    pub(crate) fn log_args(repo: &RepoAddress, watermark: Watermark, limit: usize) -> Vec<String> {
        let mut args = vec![
            "log".to_string(),
            "--non-interactive".to_string(),
            "-l".to_string(),
            limit.to_string(),
        ];
        if let Watermark::Seen(at) = watermark {
            args.push("-r".to_string());
            args.push(format!("{{{}}}:HEAD", at.format("%Y-%m-%dT%H:%M:%SZ")));
        }
        args.push(repo.to_string());
        args
    }
}

impl Default for SvnLogSource {
    fn default() -> Self {
        Self::new("svn")
    }
}

#[async_trait]
impl ChangeSource for SvnLogSource {
    async fn fetch_since(
        &self,
        repo: &RepoAddress,
        watermark: Watermark,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>, SourceError> {
        let args = Self::log_args(repo, watermark, limit);
        debug!(program = %self.program, ?args, "running svn log");

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SourceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SourceError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_svn_log(&String::from_utf8_lossy(&output.stdout), repo)
    }

    fn name(&self) -> &str {
        "svn"
    }
}

/// Parsed `rN | author | date | K lines` header.
struct EntryHeader {
    revision: Revision,
    author: String,
    timestamp: DateTime<Utc>,
    line_count: usize,
}

fn parse_header(line: &str) -> Result<EntryHeader, SourceError> {
    let parts: Vec<&str> = line.split(" | ").collect();
    if parts.len() < 4 {
        return Err(SourceError::Parse(format!("unexpected log header: {line}")));
    }
    let last = parts.len() - 1;

    let revision = parts[0]
        .trim()
        .strip_prefix('r')
        .and_then(|n| n.parse::<u64>().ok())
        .map(Revision::new)
        .ok_or_else(|| SourceError::Parse(format!("bad revision in header: {line}")))?;

    // The author field is the only one that could itself contain " | ".
    let author = parts[1..last - 1].join(" | ");

    // "2017-03-05 14:07:09 +0300 (Sun, 05 Mar 2017)"
    let date_field = parts[last - 1];
    let date_text = date_field.split(" (").next().unwrap_or(date_field).trim();
    let timestamp = DateTime::parse_from_str(date_text, "%Y-%m-%d %H:%M:%S %z")
        .map_err(|e| SourceError::Parse(format!("bad date '{date_text}': {e}")))?
        .with_timezone(&Utc);

    let line_count = parts[last]
        .split_whitespace()
        .next()
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| SourceError::Parse(format!("bad line count in header: {line}")))?;

    Ok(EntryHeader {
        revision,
        author,
        timestamp,
        line_count,
    })
}

/// Parse the plain-text output of `svn log` (without `-v`).
///
/// Message bodies are read by the line count announced in each header, so a
/// message that itself contains a separator line does not break parsing.
pub fn parse_svn_log(output: &str, repository: &RepoAddress) -> Result<Vec<ChangeRecord>, SourceError> {
    let mut lines = output.lines();
    let mut records = Vec::new();

    while let Some(line) = lines.next() {
        let line = line.trim_end_matches('\r');
        if line == SEPARATOR || line.trim().is_empty() {
            continue;
        }

        let header = parse_header(line)?;

        // Blank line between header and message.
        let _ = lines.next();

        let message: Vec<&str> = lines
            .by_ref()
            .take(header.line_count)
            .map(|l| l.trim_end_matches('\r'))
            .collect();

        records.push(ChangeRecord {
            revision: header.revision,
            timestamp: header.timestamp,
            author: header.author,
            message: message.join("\n"),
            repository: repository.clone(),
        });
    }

    Ok(records)
}
