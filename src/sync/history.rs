use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;

use crate::config::{AuthorsConfig, SyncConfig};
use crate::registry::{HistoryDefaults, HistoryId, Registry, RepositoryId, TestId};
use crate::scm::{LogLine, SourceControl};

use super::author::AuthorResolver;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryReport {
    /// Tests whose folder log was scanned
    pub scanned: usize,
    /// New history entries
    pub recorded: usize,
    /// Tests without a folder
    pub skipped: usize,
    /// Tests whose log could not be read
    pub failed: usize,
}

/// Records recent commits touching each test's folder.
pub struct HistoryTracker<'a> {
    authors: AuthorResolver<'a>,
    recent_days: u32,
    concurrency: usize,
}

impl<'a> HistoryTracker<'a> {
    pub fn new(sync: &SyncConfig, authors: &'a AuthorsConfig) -> Self {
        Self {
            authors: AuthorResolver::new(authors),
            recent_days: sync.effective_recent_days(),
            concurrency: sync.log_concurrency.max(1),
        }
    }

    /// Scans the log of every test in `repository` and records its latest
    /// commit.
    ///
    /// Logs are read concurrently; entries are written one test at a time.
    /// A log that cannot be read is logged and that test is left as it is.
    pub async fn track<S: SourceControl>(
        &self,
        registry: &mut Registry,
        scm: &S,
        repository: RepositoryId,
    ) -> HistoryReport {
        let mut report = HistoryReport::default();
        let mut scoped = Vec::new();

        for id in registry.tests_of_repository(repository) {
            let Some(test) = registry.test(id) else {
                continue;
            };
            match test.folder.as_deref() {
                Some(folder) if !folder.is_empty() => {
                    scoped.push((id, test.name.clone(), folder.to_string()));
                }
                _ => {
                    warn!("The test '{}' has no folder, skipping history", test.name);
                    report.skipped += 1;
                }
            }
        }

        let recent_days = self.recent_days;
        let logs: Vec<_> = stream::iter(scoped)
            .map(|(id, name, folder)| async move {
                let rows = scm.log(recent_days, &folder).await;
                (id, name, rows)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        for (id, name, rows) in logs {
            let rows = match rows {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Failed to read the history of '{name}': {e}");
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;
            let before = registry.history().len();
            if self.record_commits(registry, id, &name, &rows).is_some()
                && registry.history().len() > before
            {
                report.recorded += 1;
            }
        }

        info!(
            "History of {} tests scanned, {} new entries",
            report.scanned, report.recorded
        );
        report
    }

    /// Records the first well-formed log row for `test` and stops there.
    ///
    /// Blank and malformed rows are skipped. The version comes from a tag
    /// named after the test (`/CoreOS/bash/smoke` tagged
    /// `CoreOS-bash-smoke-1_0-2` yields `1_0-2`).
    pub fn record_commits(
        &self,
        registry: &mut Registry,
        test: TestId,
        test_name: &str,
        rows: &[String],
    ) -> Option<HistoryId> {
        let tag = version_pattern(test_name);

        for row in rows.iter().filter(|row| !row.trim().is_empty()) {
            let Some(line) = LogLine::parse(row) else {
                warn!("Skipping malformed log row for '{test_name}': {row}");
                continue;
            };

            let version = tag
                .as_ref()
                .and_then(|re| re.captures(&line.decoration))
                .map(|caps| caps[1].to_string());
            let author = self.authors.resolve_parts(
                registry,
                Some(&line.author_name),
                Some(&line.author_email),
            );

            let (id, created) = registry.get_or_create_history(
                &line.hash,
                test,
                HistoryDefaults {
                    version,
                    date: line.date,
                    author: Some(author),
                },
            );
            if created {
                debug!("Recorded commit {} for '{test_name}'", line.hash);
            }
            return Some(id);
        }

        None
    }
}

/// Tag pattern for a test name: slashes become dashes, then a
/// `-<version>` made of digits, underscores and dashes.
fn version_pattern(test_name: &str) -> Option<Regex> {
    let prefix = regex::escape(&test_name.trim_start_matches('/').replace('/', "-"));
    Regex::new(&format!("{prefix}-([0-9_-]+)[^0-9_-]")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scm::fake::FakeCheckout;

    const TAGGED: &str = "1731d5af|Jiri Novak|jnovak@example.com|2013-01-31 17:45:06 +0100| (tag: refs/tags/CoreOS-bash-smoke-1_0-2)";
    const PLAIN: &str = "9f00aa12|Jane Doe|jane@example.com|2013-01-30 09:00:00 +0100|";

    fn rows(rows: &[&str]) -> Vec<String> {
        rows.iter().map(|r| (*r).to_string()).collect()
    }

    fn setup() -> (Registry, RepositoryId, TestId) {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let (test, _) = registry.get_or_create_test("/CoreOS/bash/smoke", repo);
        registry.update_test(test, |t| t.folder = Some("bash/smoke".into()));
        (registry, repo, test)
    }

    #[cfg(test)]
    mod version_pattern {
        use super::*;

        #[test]
        fn extracts_tag_version() {
            let re = version_pattern("/CoreOS/bash/smoke").unwrap();
            let caps = re.captures(" (tag: refs/tags/CoreOS-bash-smoke-1_0-2)").unwrap();
            assert_eq!(&caps[1], "1_0-2");
        }

        #[test]
        fn escapes_special_characters() {
            let re = version_pattern("/CoreOS/c++/smoke").unwrap();
            assert!(re.is_match("(tag: refs/tags/CoreOS-c++-smoke-3)"));
            assert!(!re.is_match("(tag: refs/tags/CoreOS-cc-smoke-3)"));
        }

        #[test]
        fn other_tests_tags_do_not_match() {
            let re = version_pattern("/CoreOS/bash/smoke").unwrap();
            assert!(!re.is_match("(tag: refs/tags/CoreOS-zsh-smoke-1_0-2)"));
        }
    }

    #[test]
    fn test_records_first_row_only() {
        let (mut registry, _, test) = setup();
        let authors = AuthorsConfig::default();
        let tracker = HistoryTracker::new(&SyncConfig::default(), &authors);

        let id = tracker
            .record_commits(&mut registry, test, "/CoreOS/bash/smoke", &rows(&[TAGGED, PLAIN]))
            .unwrap();

        assert_eq!(registry.history().len(), 1);
        let entry = &registry.history()[0];
        assert_eq!(entry.id, id);
        assert_eq!(entry.commit, "1731d5af");
        assert_eq!(entry.version.as_deref(), Some("1_0-2"));
        let author = registry.author(entry.author.unwrap()).unwrap();
        assert_eq!(author.email, "jnovak@example.com");
        assert_eq!(author.name, "Jiri Novak");
    }

    #[test]
    fn test_skips_blank_and_malformed_rows() {
        let (mut registry, _, test) = setup();
        let authors = AuthorsConfig::default();
        let tracker = HistoryTracker::new(&SyncConfig::default(), &authors);

        tracker.record_commits(
            &mut registry,
            test,
            "/CoreOS/bash/smoke",
            &rows(&["", "garbage", PLAIN]),
        );

        assert_eq!(registry.history().len(), 1);
        assert_eq!(registry.history()[0].commit, "9f00aa12");
        assert!(registry.history()[0].version.is_none());
    }

    #[test]
    fn test_empty_log_records_nothing() {
        let (mut registry, _, test) = setup();
        let authors = AuthorsConfig::default();
        let tracker = HistoryTracker::new(&SyncConfig::default(), &authors);

        assert!(tracker
            .record_commits(&mut registry, test, "/CoreOS/bash/smoke", &rows(&[""]))
            .is_none());
        assert!(registry.history().is_empty());
    }

    #[test]
    fn test_existing_entry_is_not_modified() {
        let (mut registry, _, test) = setup();
        let authors = AuthorsConfig::default();
        let tracker = HistoryTracker::new(&SyncConfig::default(), &authors);
        tracker.record_commits(&mut registry, test, "/CoreOS/bash/smoke", &rows(&[TAGGED]));
        let revision = registry.revision();

        tracker.record_commits(&mut registry, test, "/CoreOS/bash/smoke", &rows(&[TAGGED]));

        assert_eq!(registry.revision(), revision);
        assert_eq!(registry.history().len(), 1);
    }

    #[tokio::test]
    async fn test_track_repository() {
        let (mut registry, repo, test) = setup();
        let (loose, _) = registry.get_or_create_test("/CoreOS/bash/loose", repo);
        let authors = AuthorsConfig::default();
        let tracker = HistoryTracker::new(&SyncConfig::default(), &authors);
        let scm = FakeCheckout::new().with_log("bash/smoke", &[TAGGED, ""]);

        let report = tracker.track(&mut registry, &scm, repo).await;

        assert_eq!(report.scanned, 1);
        assert_eq!(report.recorded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(registry.history_of(test).len(), 1);
        assert!(registry.history_of(loose).is_empty());

        let again = tracker.track(&mut registry, &scm, repo).await;
        assert_eq!(again.recorded, 0);
    }

    #[tokio::test]
    async fn test_unreadable_log_skips_only_that_test() {
        let (mut registry, repo, test) = setup();
        let (broken, _) = registry.get_or_create_test("/CoreOS/bash/broken", repo);
        registry.update_test(broken, |t| t.folder = Some("bash/broken".into()));
        let authors = AuthorsConfig::default();
        let tracker = HistoryTracker::new(&SyncConfig::default(), &authors);
        let scm = FakeCheckout::new()
            .with_log("bash/smoke", &[TAGGED])
            .with_failing_log("bash/broken");

        let report = tracker.track(&mut registry, &scm, repo).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.scanned, 1);
        assert_eq!(report.recorded, 1);
        assert_eq!(registry.history_of(test).len(), 1);
        assert!(registry.history_of(broken).is_empty());
    }
}
