use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};

use super::Registry;

/// JSON-backed storage for the [`Registry`].
///
/// The registry lives in a single file, by default in the platform data directory:
/// - Linux: `~/.local/share/tttt/registry.json`
/// - macOS: `~/Library/Application Support/tttt/registry.json`
///
/// Writers serialize on an advisory lock on `registry.json.lock` next to it.
pub struct RegistryStore {
    path: PathBuf,
    lock_path: PathBuf,
    owner_path: PathBuf,
    lock_timeout: Duration,
}

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

impl RegistryStore {
    /// Opens the store at `path`, or at the default location when `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the data directory cannot be determined or created.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => dirs::data_dir()
                .ok_or_else(|| TrackerError::Registry("No data directory found".into()))?
                .join("tttt")
                .join("registry.json"),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            lock_path: sibling(&path, "lock"),
            owner_path: sibling(&path, "lock.owner"),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            path,
        })
    }

    /// How long [`lock`](Self::lock) waits for another holder.
    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the registry, starting empty when no file exists yet.
    ///
    /// A file that exists but cannot be parsed is an error rather than an
    /// empty registry, so a corrupt store is never silently overwritten.
    pub fn load(&self) -> Result<Registry> {
        if !self.path.exists() {
            info!("No registry at {}, starting empty", self.path.display());
            return Ok(Registry::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let registry: Registry = serde_json::from_str(&content)?;
        debug!(
            "Loaded registry from {}: {} repositories, {} tests, {} authors, {} recipes",
            self.path.display(),
            registry.repositories().len(),
            registry.tests().len(),
            registry.authors().len(),
            registry.recipes().len()
        );
        Ok(registry)
    }

    /// Writes the registry if it changed since it was loaded.
    ///
    /// Returns whether anything was written.
    pub fn save(&self, registry: &Registry) -> Result<bool> {
        if registry.revision() == 0 {
            debug!("Registry unchanged, skipping write");
            return Ok(false);
        }

        let content = serde_json::to_string_pretty(registry)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        debug!(
            "Saved registry ({} changes) to {}",
            registry.revision(),
            self.path.display()
        );
        Ok(true)
    }

    /// Takes the registry-wide exclusive lock, waiting up to the lock
    /// timeout for another process to finish.
    ///
    /// Hold the returned guard from before [`load`](Self::load) until after
    /// [`save`](Self::save). The lock is an OS advisory lock, so it is
    /// released when the holder exits, even without cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Locked`] if the lock is still held when the
    /// timeout expires.
    pub fn lock(&self) -> Result<RegistryLock> {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;

        let start = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.raw_os_error() != fs2::lock_contended_error().raw_os_error() => {
                    return Err(e.into());
                }
                Err(_) if start.elapsed() >= self.lock_timeout => {
                    let holder = read_owner(&self.owner_path)
                        .map(|owner| format!(" (held by pid {} since {})", owner.pid, owner.acquired_at))
                        .unwrap_or_default();
                    return Err(TrackerError::Locked(format!(
                        "{}{holder}",
                        self.path.display()
                    )));
                }
                Err(_) => {
                    if attempt == 0 {
                        info!("Waiting for the registry lock on {}", self.path.display());
                    }
                    // 50ms doubling up to 800ms
                    let backoff = Duration::from_millis(50 * (1u64 << attempt.min(4)));
                    attempt += 1;
                    std::thread::sleep(backoff.min(self.lock_timeout));
                }
            }
        }

        let owner = LockOwner {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        if let Err(e) = fs::write(&self.owner_path, serde_json::to_string(&owner)?) {
            warn!("Failed to record lock owner in {}: {e}", self.owner_path.display());
        }
        debug!("Acquired registry lock {}", self.lock_path.display());

        Ok(RegistryLock { file })
    }
}

/// Who holds the registry lock, kept next to the lock file for diagnostics.
#[derive(Debug, Serialize, Deserialize)]
struct LockOwner {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

fn read_owner(path: &Path) -> Option<LockOwner> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Exclusive hold on the registry; released on drop.
#[derive(Debug)]
pub struct RegistryLock {
    file: fs::File,
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release the registry lock: {e}");
        }
    }
}

// "registry.json" + "lock" → "registry.json.lock"
fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = RegistryStore::open(Some(&temp_dir.path().join("registry.json"))).unwrap();

        let registry = store.load().unwrap();
        assert!(registry.tests().is_empty());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = RegistryStore::open(Some(&temp_dir.path().join("registry.json"))).unwrap();

        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        registry.get_or_create_test("/CoreOS/bash/smoke", repo);

        assert!(store.save(&registry).unwrap());

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.tests().len(), 1);
        assert_eq!(reloaded.tests()[0].name, "/CoreOS/bash/smoke");
    }

    #[test]
    fn test_unchanged_registry_is_not_written() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        let store = RegistryStore::open(Some(&path)).unwrap();

        assert!(!store.save(&Registry::new()).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_registry_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        fs::write(&path, "{ not json").unwrap();
        let store = RegistryStore::open(Some(&path)).unwrap();

        assert!(store.load().is_err());
    }

    #[test]
    fn test_lock_is_exclusive_across_stores() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        let first = RegistryStore::open(Some(&path)).unwrap();
        let second = RegistryStore::open(Some(&path))
            .unwrap()
            .with_lock_timeout(Duration::from_millis(20));

        let lock = first.lock().unwrap();
        let result = second.lock();
        assert!(matches!(result, Err(TrackerError::Locked(_))));
        let message = result.unwrap_err().to_string();
        assert!(message.contains(&format!("pid {}", std::process::id())));

        drop(lock);
        assert!(second.lock().is_ok());
    }

    #[test]
    fn test_interleaved_sessions_keep_both_writes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        let sync = RegistryStore::open(Some(&path)).unwrap();

        let lock = sync.lock().unwrap();
        let mut registry = sync.load().unwrap();

        let report_path = path.clone();
        let report = std::thread::spawn(move || {
            let store = RegistryStore::open(Some(&report_path))
                .unwrap()
                .with_lock_timeout(Duration::from_secs(10));
            let _lock = store.lock().unwrap();
            let mut registry = store.load().unwrap();
            registry.get_or_create_group("from-report");
            store.save(&registry).unwrap();
        });

        std::thread::sleep(Duration::from_millis(100));
        registry.get_or_create_group("from-sync");
        sync.save(&registry).unwrap();
        drop(lock);
        report.join().unwrap();

        let names: Vec<String> = sync
            .load()
            .unwrap()
            .groups()
            .iter()
            .map(|g| g.name.clone())
            .collect();
        assert_eq!(names, vec!["from-sync".to_string(), "from-report".to_string()]);
    }

    #[test]
    fn test_leftover_lock_file_does_not_block() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("registry.json");
        fs::write(temp_dir.path().join("registry.json.lock"), "").unwrap();
        fs::write(
            temp_dir.path().join("registry.json.lock.owner"),
            r#"{"pid":999999,"acquired_at":"2024-01-30T09:00:00Z"}"#,
        )
        .unwrap();
        let store = RegistryStore::open(Some(&path))
            .unwrap()
            .with_lock_timeout(Duration::from_millis(20));

        assert!(store.lock().is_ok());
    }

    #[test]
    fn test_sibling_paths() {
        assert_eq!(
            sibling(Path::new("/var/lib/tttt/registry.json"), "lock"),
            PathBuf::from("/var/lib/tttt/registry.json.lock")
        );
    }
}
