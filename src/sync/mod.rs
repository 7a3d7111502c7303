//! Synchronization of test descriptors and commit history from checkouts.

mod author;
mod groups;
mod history;
mod makefile;
mod merge;
mod reconcile;

use std::path::Path;

use log::{info, warn};
use serde::Serialize;

use crate::config::{Config, SyncConfig};
use crate::error::Result;
use crate::output::PhaseProgress;
use crate::registry::Registry;
use crate::scm::{normalize_remote_url, pull_with_retries, SourceControl};

pub use history::HistoryReport;
pub use reconcile::ReconcileReport;

use history::HistoryTracker;
use reconcile::Reconciler;

/// How a checkout is known in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryIdentity {
    /// Normalized remote URL, or the checkout path without a remote
    pub url: String,
    /// Checkout folder name
    pub name: String,
}

impl RepositoryIdentity {
    /// Derives the identity from the checkout's `origin` remote.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote cannot be queried.
    pub async fn detect<S: SourceControl>(scm: &S) -> Result<Self> {
        let root = scm.root();
        let url = match scm.remote_url().await? {
            Some(remote) => normalize_remote_url(&remote),
            None => {
                warn!("{} has no origin remote, using its path", root.display());
                root.display().to_string()
            }
        };

        Ok(Self {
            url,
            name: folder_name(root),
        })
    }
}

fn folder_name(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

/// Outcome of syncing one checkout.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub repository: String,
    pub url: String,
    /// False when the pull failed and the existing checkout was used
    pub refreshed: bool,
    pub reconcile: ReconcileReport,
    pub history: HistoryReport,
}

/// Refreshes a checkout, reconciles its descriptors, then records history.
///
/// A failed refresh is logged and the sync continues on the checkout as it
/// is, as does a test whose log cannot be read. The caller holds the
/// registry lock.
///
/// # Errors
///
/// Returns an error if descriptors cannot be listed.
pub async fn sync_checkout<S: SourceControl>(
    registry: &mut Registry,
    scm: &S,
    identity: &RepositoryIdentity,
    config: &Config,
    progress: &mut PhaseProgress,
) -> Result<SyncReport> {
    progress.start("Refreshing checkout");
    let refreshed = refresh(scm, &config.sync).await;
    progress.finish(if refreshed {
        "Checkout refreshed"
    } else {
        "Checkout refresh failed, using local state"
    });

    let repository = registry.get_or_create_repository(&identity.url, &identity.name);
    if let Some(base) = &config.sync.web_base_url {
        let web_url = format!("{}/{}", base.trim_end_matches('/'), identity.name);
        registry.set_repository_web_url(repository, Some(web_url));
    }

    progress.start("Reconciling test descriptors");
    let reconciler = Reconciler::new(registry, repository, &config.authors);
    let reconcile = reconciler
        .reconcile(registry, scm, &config.sync.makefile_pattern)
        .await?;
    progress.finish("Test descriptors reconciled");

    progress.start("Recording commit history");
    let tracker = HistoryTracker::new(&config.sync, &config.authors);
    let history = tracker.track(registry, scm, repository).await;
    progress.finish("Commit history recorded");

    info!("Synced {} ({})", identity.name, identity.url);

    Ok(SyncReport {
        repository: identity.name.clone(),
        url: identity.url.clone(),
        refreshed,
        reconcile,
        history,
    })
}

async fn refresh<S: SourceControl>(scm: &S, config: &SyncConfig) -> bool {
    if let Err(e) = scm.hard_reset_to_head().await {
        warn!("Reset of {} failed: {e}", scm.root().display());
    }
    match pull_with_retries(scm, config.pull_retries, config.retry_delay()).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Pull of {} failed: {e}", scm.root().display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::scm::fake::FakeCheckout;

    const MAKEFILE: &str = "export TEST=/CoreOS/bash/Sanity/smoke\n\
        \t@echo \"Owner:        Jane Doe <jane@example.com>\" > $(METADATA)\n\
        \t@echo \"Name:         $(TEST)\" >> $(METADATA)\n";
    const ROW: &str = "9f00aa12|Jane Doe|jane@example.com|2024-01-30 09:00:00 +0100| (tag: refs/tags/CoreOS-bash-Sanity-smoke-2_1-1)";

    fn checkout() -> FakeCheckout {
        FakeCheckout::new()
            .with_remote("https://jane@git.example.com/qa/tests.git")
            .with_file("bash/Sanity/smoke/Makefile", MAKEFILE)
            .with_log("bash/Sanity/smoke", &[ROW])
    }

    #[tokio::test]
    async fn test_identity_from_remote() {
        let identity = RepositoryIdentity::detect(&checkout()).await.unwrap();

        assert_eq!(identity.url, "git.example.com/qa/tests.git");
        assert_eq!(identity.name, "tests");
    }

    #[tokio::test]
    async fn test_identity_without_remote_uses_path() {
        let identity = RepositoryIdentity::detect(&FakeCheckout::new()).await.unwrap();

        assert_eq!(identity.url, "/srv/checkouts/tests");
    }

    #[tokio::test]
    async fn test_sync_checkout_end_to_end() {
        let scm = checkout();
        let mut config = Config::default();
        config.sync.web_base_url = Some("https://git.example.com/cgit/".into());
        let identity = RepositoryIdentity::detect(&scm).await.unwrap();
        let mut registry = Registry::new();

        let mut progress = PhaseProgress::hidden();

        let report = sync_checkout(&mut registry, &scm, &identity, &config, &mut progress)
            .await
            .unwrap();

        assert!(report.refreshed);
        assert_eq!(scm.resets.load(Ordering::SeqCst), 1);
        assert_eq!(scm.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(report.reconcile.created, 1);
        assert_eq!(report.history.recorded, 1);

        let repo = registry.repository_by_name("tests").unwrap();
        assert_eq!(repo.web_url.as_deref(), Some("https://git.example.com/cgit/tests"));

        let test = registry.test_by_name("/CoreOS/bash/Sanity/smoke").unwrap();
        let history = registry.history_of(test.id);
        assert_eq!(history[0].version.as_deref(), Some("2_1-1"));
    }

    #[tokio::test]
    async fn test_second_sync_writes_nothing() {
        let scm = checkout();
        let config = Config::default();
        let identity = RepositoryIdentity::detect(&scm).await.unwrap();
        let mut registry = Registry::new();
        let mut progress = PhaseProgress::hidden();

        sync_checkout(&mut registry, &scm, &identity, &config, &mut progress)
            .await
            .unwrap();
        let revision = registry.revision();
        sync_checkout(&mut registry, &scm, &identity, &config, &mut progress)
            .await
            .unwrap();

        assert_eq!(registry.revision(), revision);
    }

    #[tokio::test]
    async fn test_failed_pull_still_syncs() {
        let scm = checkout().with_failing_pulls();
        let identity = RepositoryIdentity::detect(&scm).await.unwrap();
        let mut registry = Registry::new();
        let mut config = Config::default();
        config.sync.pull_retries = 2;
        config.sync.retry_delay_seconds = 0;

        let report = sync_checkout(
            &mut registry,
            &scm,
            &identity,
            &config,
            &mut PhaseProgress::hidden(),
        )
        .await
        .unwrap();

        assert!(!report.refreshed);
        assert_eq!(scm.pulls.load(Ordering::SeqCst), 3);
        assert_eq!(report.reconcile.created, 1);
    }

    #[tokio::test]
    async fn test_unreadable_log_keeps_reconciled_tests() {
        let scm = FakeCheckout::new()
            .with_file("bash/Sanity/smoke/Makefile", MAKEFILE)
            .with_failing_log("bash/Sanity/smoke");
        let identity = RepositoryIdentity::detect(&scm).await.unwrap();
        let mut registry = Registry::new();

        let report = sync_checkout(
            &mut registry,
            &scm,
            &identity,
            &Config::default(),
            &mut PhaseProgress::hidden(),
        )
        .await
        .unwrap();

        assert_eq!(report.reconcile.created, 1);
        assert_eq!(report.history.failed, 1);
        assert!(registry.test_by_name("/CoreOS/bash/Sanity/smoke").is_some());
    }
}
