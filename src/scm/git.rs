use std::path::{Path, PathBuf};

use log::debug;
use tokio::process::Command;

use crate::error::{Result, TrackerError};

use super::{SourceControl, LOG_FORMAT};

/// A local git checkout driven through the `git` binary.
pub struct GitCheckout {
    path: PathBuf,
}

impl GitCheckout {
    /// Opens an existing checkout.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::MissingCheckout`] if `path` is not a directory;
    /// no git command is attempted in that case.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(TrackerError::MissingCheckout(path.to_path_buf()));
        }

        Ok(Self {
            path: path.canonicalize()?,
        })
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        debug!("git {} (in {})", args.join(" "), self.path.display());

        let output = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(args)
            .output()
            .await?;

        if !output.status.success() {
            return Err(TrackerError::Git {
                command: args.first().copied().unwrap_or_default().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SourceControl for GitCheckout {
    fn root(&self) -> &Path {
        &self.path
    }

    async fn pull(&self) -> Result<()> {
        self.git(&["pull"]).await.map(|_| ())
    }

    async fn hard_reset_to_head(&self) -> Result<()> {
        self.git(&["reset", "--hard", "HEAD"]).await.map(|_| ())
    }

    async fn list_files(&self, pattern: &str) -> Result<Vec<String>> {
        let out = self.git(&["ls-files", "--full-name", pattern]).await?;
        Ok(out.lines().map(str::to_string).collect())
    }

    async fn read_file(&self, relative: &str) -> Result<String> {
        Ok(tokio::fs::read_to_string(self.path.join(relative)).await?)
    }

    async fn log(&self, since_days: u32, path_scope: &str) -> Result<Vec<String>> {
        let since = format!("--since={since_days}.days");
        let pretty = format!("--pretty={LOG_FORMAT}");
        let out = self
            .git(&[
                "log",
                "--decorate=full",
                &since,
                "--simplify-by-decoration",
                &pretty,
                "--follow",
                "HEAD",
                "--",
                path_scope,
            ])
            .await?;
        Ok(out.split('\n').map(str::to_string).collect())
    }

    async fn remote_url(&self) -> Result<Option<String>> {
        match self.git(&["config", "--get", "remote.origin.url"]).await {
            Ok(url) if !url.trim().is_empty() => Ok(Some(url.trim().to_string())),
            // `git config --get` exits non-zero when the key is unset
            Ok(_) | Err(TrackerError::Git { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_checkout_fails_fast() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");

        let result = GitCheckout::open(&missing);
        assert!(matches!(result, Err(TrackerError::MissingCheckout(_))));
    }

    #[test]
    fn test_open_existing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let checkout = GitCheckout::open(temp_dir.path()).unwrap();

        assert_eq!(checkout.root(), temp_dir.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_read_file_relative_to_root() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("bash/smoke")).unwrap();
        std::fs::write(temp_dir.path().join("bash/smoke/Makefile"), "TEST=/bash/smoke\n").unwrap();
        let checkout = GitCheckout::open(temp_dir.path()).unwrap();

        let content = checkout.read_file("bash/smoke/Makefile").await.unwrap();
        assert_eq!(content, "TEST=/bash/smoke\n");
    }
}
