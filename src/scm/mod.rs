#[cfg(test)]
pub mod fake;
mod git;

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::warn;
use regex::Regex;

use crate::error::Result;

pub use git::GitCheckout;

/// Pretty format for `git log` rows consumed by [`LogLine::parse`].
pub const LOG_FORMAT: &str = "%H|%aN|%ae|%ai|%d";

/// Access to a source-control checkout.
///
/// Paths passed in and returned are relative to the repository root.
#[allow(async_fn_in_trait)]
pub trait SourceControl {
    /// Absolute path of the checkout.
    fn root(&self) -> &Path;

    /// Fetches and merges upstream changes once.
    async fn pull(&self) -> Result<()>;

    /// Discards local modifications.
    async fn hard_reset_to_head(&self) -> Result<()>;

    /// Tracked files matching a glob such as `*Makefile`.
    async fn list_files(&self, pattern: &str) -> Result<Vec<String>>;

    async fn read_file(&self, relative: &str) -> Result<String>;

    /// Raw decorated log rows in [`LOG_FORMAT`] for commits touching
    /// `path_scope` within the last `since_days` days.
    async fn log(&self, since_days: u32, path_scope: &str) -> Result<Vec<String>>;

    /// URL of the `origin` remote, if configured.
    async fn remote_url(&self) -> Result<Option<String>>;
}

/// Pulls `scm`, retrying a failed pull up to `retries` times.
///
/// The wait before retry `n` is `n * delay`.
///
/// # Errors
///
/// Returns the last pull error once the retries are used up.
pub async fn pull_with_retries<S: SourceControl>(
    scm: &S,
    retries: u32,
    delay: Duration,
) -> Result<()> {
    let mut retry_count = 0;
    loop {
        match scm.pull().await {
            Ok(()) => return Ok(()),
            Err(e) if retry_count < retries => {
                retry_count += 1;
                warn!(
                    "Pull of {} failed ({e}), retrying in {}s ({retry_count}/{retries})...",
                    scm.root().display(),
                    (delay * retry_count).as_secs()
                );
                tokio::time::sleep(delay * retry_count).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// One row of the structured commit log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub date: DateTime<Utc>,
    /// Ref decoration, e.g. " (tag: refs/tags/bash-smoke-1_0-2)"; empty when undecorated
    pub decoration: String,
}

impl LogLine {
    /// Parses a `hash|name|email|date|decoration` row.
    ///
    /// Returns `None` when the row does not have five fields or the date is
    /// not in `git`'s ISO-like `%ai` format.
    pub fn parse(row: &str) -> Option<Self> {
        let fields: Vec<&str> = row.split('|').collect();
        let [hash, author_name, author_email, date, decoration] = fields.as_slice() else {
            return None;
        };

        let date = DateTime::parse_from_str(date.trim(), "%Y-%m-%d %H:%M:%S %z")
            .or_else(|_| DateTime::parse_from_rfc3339(date.trim()))
            .ok()?
            .with_timezone(&Utc);

        Some(Self {
            hash: hash.trim().to_string(),
            author_name: author_name.trim().to_string(),
            author_email: author_email.trim().to_string(),
            date,
            decoration: decoration.trim().to_string(),
        })
    }
}

static REMOTE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*(@|//)").expect("remote prefix regex"));

/// Strips scheme and credentials from a remote URL so that
/// `https://user@git.example.com/qa/tests.git` and
/// `ssh://git.example.com/qa/tests.git` identify the same repository.
pub fn normalize_remote_url(url: &str) -> String {
    REMOTE_PREFIX.replace(url.trim(), "").into_owned()
}
