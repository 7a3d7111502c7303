//! In-memory checkout for exercising sync logic without a git binary.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, TrackerError};

use super::SourceControl;

pub struct FakeCheckout {
    root: PathBuf,
    files: BTreeMap<String, String>,
    logs: BTreeMap<String, Vec<String>>,
    failing_logs: BTreeSet<String>,
    remote: Option<String>,
    failing_pulls: u32,
    pub pulls: AtomicU32,
    pub resets: AtomicU32,
}

impl FakeCheckout {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/srv/checkouts/tests"),
            files: BTreeMap::new(),
            logs: BTreeMap::new(),
            failing_logs: BTreeSet::new(),
            remote: None,
            failing_pulls: 0,
            pulls: AtomicU32::new(0),
            resets: AtomicU32::new(0),
        }
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_string(), content.to_string());
        self
    }

    pub fn with_log(mut self, folder: &str, rows: &[&str]) -> Self {
        self.logs.insert(
            folder.to_string(),
            rows.iter().map(|row| (*row).to_string()).collect(),
        );
        self
    }

    pub fn with_failing_log(mut self, folder: &str) -> Self {
        self.failing_logs.insert(folder.to_string());
        self
    }

    pub fn with_remote(mut self, url: &str) -> Self {
        self.remote = Some(url.to_string());
        self
    }

    /// Every pull attempt fails.
    pub fn with_failing_pulls(self) -> Self {
        self.with_failing_pull_attempts(u32::MAX)
    }

    /// The first `attempts` pulls fail.
    pub fn with_failing_pull_attempts(mut self, attempts: u32) -> Self {
        self.failing_pulls = attempts;
        self
    }
}

impl SourceControl for FakeCheckout {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn pull(&self) -> Result<()> {
        let attempt = self.pulls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failing_pulls {
            return Err(TrackerError::Git {
                command: "pull".to_string(),
                message: "Could not resolve host".to_string(),
            });
        }
        Ok(())
    }

    async fn hard_reset_to_head(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_files(&self, pattern: &str) -> Result<Vec<String>> {
        let suffix = pattern.trim_start_matches('*');
        Ok(self
            .files
            .keys()
            .filter(|path| path.ends_with(suffix))
            .cloned()
            .collect())
    }

    async fn read_file(&self, relative: &str) -> Result<String> {
        self.files.get(relative).cloned().ok_or_else(|| {
            TrackerError::Io(io::Error::new(io::ErrorKind::NotFound, relative.to_string()))
        })
    }

    async fn log(&self, _since_days: u32, path_scope: &str) -> Result<Vec<String>> {
        if self.failing_logs.contains(path_scope) {
            return Err(TrackerError::Git {
                command: "log".to_string(),
                message: format!("bad object for '{path_scope}'"),
            });
        }
        Ok(self.logs.get(path_scope).cloned().unwrap_or_default())
    }

    async fn remote_url(&self) -> Result<Option<String>> {
        Ok(self.remote.clone())
    }
}
