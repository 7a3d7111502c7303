use std::path::Path;
use std::sync::LazyLock;

use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;

use crate::config::AuthorsConfig;
use crate::error::Result;
use crate::registry::{Registry, RepositoryId, TestId};
use crate::scm::SourceControl;

use super::author::AuthorResolver;
use super::groups::GroupCache;
use super::makefile::{Descriptor, FieldValue};
use super::merge;

/// `test(` and `)` wrapped around dependency names
static DEPENDENCY_WRAPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(test\(|\))").expect("dependency wrapper regex"));

/// Counters for one reconciliation batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Makefiles found in the checkout
    pub scanned: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Makefiles without a usable `Name`, or unreadable
    pub skipped: usize,
    /// Duplicate rows collapsed into their canonical test
    pub merged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Unchanged,
}

/// Merges Makefile descriptors of one repository into the registry.
pub struct Reconciler<'a> {
    repository: RepositoryId,
    authors: AuthorResolver<'a>,
    groups: GroupCache,
}

impl<'a> Reconciler<'a> {
    /// Prepares a batch for `repository`, caching the current group tags.
    pub fn new(registry: &Registry, repository: RepositoryId, authors: &'a AuthorsConfig) -> Self {
        Self {
            repository,
            authors: AuthorResolver::new(authors),
            groups: GroupCache::load(registry),
        }
    }

    /// Reconciles every descriptor file matching `pattern` in the checkout.
    ///
    /// A descriptor that cannot be read or lacks a `Name` is logged and
    /// skipped; the rest of the batch continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkout's files cannot be listed.
    pub async fn reconcile<S: SourceControl>(
        &self,
        registry: &mut Registry,
        scm: &S,
        pattern: &str,
    ) -> Result<ReconcileReport> {
        let files = scm.list_files(pattern).await?;
        info!(
            "Reconciling {} descriptors from {}",
            files.len(),
            scm.root().display()
        );

        let mut report = ReconcileReport {
            scanned: files.len(),
            ..ReconcileReport::default()
        };

        // Dependencies are resolved once every descriptor of the batch is
        // registered, so a test may require one listed after it.
        let mut reconciled: Vec<(TestId, Option<FieldValue>, Outcome)> = Vec::new();

        for file in files.iter().filter(|f| !f.is_empty()) {
            let folder = Path::new(file)
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();

            let text = match scm.read_file(file).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to read '{file}': {e}");
                    report.skipped += 1;
                    continue;
                }
            };

            let descriptor = Descriptor::parse(&text);
            match self.reconcile_descriptor(registry, &folder, &descriptor, &mut report) {
                Some((test, outcome)) => {
                    reconciled.push((test, descriptor.get("RhtsRequires").cloned(), outcome));
                }
                None => report.skipped += 1,
            }
        }

        for (test, requires, outcome) in reconciled {
            let outcome = if reconcile_dependencies(registry, test, requires.as_ref())
                && outcome == Outcome::Unchanged
            {
                Outcome::Updated
            } else {
                outcome
            };

            match outcome {
                Outcome::Created => report.created += 1,
                Outcome::Updated => report.updated += 1,
                Outcome::Unchanged => report.unchanged += 1,
            }
        }

        info!(
            "Reconciled {}: {} created, {} updated, {} unchanged, {} skipped, {} merged",
            scm.root().display(),
            report.created,
            report.updated,
            report.unchanged,
            report.skipped,
            report.merged
        );

        Ok(report)
    }

    /// Registers one descriptor's test and its fields, leaving dependencies
    /// to the caller. `None` when the descriptor is skipped.
    fn reconcile_descriptor(
        &self,
        registry: &mut Registry,
        folder: &str,
        descriptor: &Descriptor,
        report: &mut ReconcileReport,
    ) -> Option<(TestId, Outcome)> {
        let Some(name) = descriptor.scalar("Name").map(normalize_name) else {
            if descriptor.is_empty() {
                warn!("The Makefile in '{folder}' declares no metadata");
            } else {
                warn!("The test '{folder}' doesn't contain Name in Makefile");
            }
            return None;
        };
        if name.is_empty() {
            warn!("The test '{folder}' declares an empty Name");
            return None;
        }

        let revision = registry.revision();
        let owner = self
            .authors
            .resolve(registry, descriptor.scalar("Owner").unwrap_or_default());

        let candidates = registry.tests_in_folder(self.repository, folder);
        let (test, created) = match candidates.as_slice() {
            [] => registry.get_or_create_test(name, self.repository),
            [only] => (*only, false),
            [canonical, ..] => {
                if let Some(plan) = merge::plan_for(registry, &candidates) {
                    info!(
                        "Collapsing {} duplicate rows of '{folder}' into test {}",
                        plan.deletions.len(),
                        plan.canonical
                    );
                    report.merged += plan.deletions.len();
                    merge::apply(registry, &plan);
                }
                (*canonical, false)
            }
        };

        let rename = registry
            .test_by_name(name)
            .is_none_or(|existing| existing.id == test);
        if !rename {
            warn!("Cannot rename test in '{folder}' to '{name}': name already taken");
        }

        let repository = self.repository;
        registry.update_test(test, |t| {
            if rename {
                t.name = name.to_string();
            }
            if t.repository.is_none() {
                t.repository = Some(repository);
            }
            t.owner = Some(owner);
            t.folder = Some(folder.to_string());
            if let Some(description) = descriptor.scalar("Description") {
                t.description = Some(description.to_string());
            }
            if let Some(time) = descriptor.scalar("TestTime") {
                t.time = Some(time.to_string());
            }
            if let Some(kind) = descriptor.scalar("Type") {
                t.kind = Some(kind.to_string());
            }
        });

        if let Some(run_for) = descriptor.get("RunFor") {
            self.groups.apply(registry, test, run_for);
        }

        debug!("Reconciled '{name}' from '{folder}'");

        let outcome = if created {
            Outcome::Created
        } else if registry.revision() != revision {
            Outcome::Updated
        } else {
            Outcome::Unchanged
        };
        Some((test, outcome))
    }
}

/// Keeps the part of a declared name before the first whitespace.
fn normalize_name(raw: &str) -> &str {
    raw.trim().split(char::is_whitespace).next().unwrap_or_default()
}

/// Replaces the test's dependencies with the tests named by `requires`.
///
/// Each declared name matches the first test whose name ends with it, since
/// declarations often use shortened paths.
fn reconcile_dependencies(
    registry: &mut Registry,
    test: TestId,
    requires: Option<&FieldValue>,
) -> bool {
    let mut targets: Vec<TestId> = Vec::new();

    for raw in requires.map(FieldValue::values).unwrap_or_default() {
        let token = DEPENDENCY_WRAPPER.replace_all(raw, "");
        let token = token.trim();
        if token.is_empty() {
            warn!("Ignoring empty dependency '{raw}'");
            continue;
        }

        match registry.find_test_by_name_suffix(token) {
            Some(dep) if dep != test && !targets.contains(&dep) => targets.push(dep),
            Some(_) => {}
            None => debug!("No test matches dependency '{token}'"),
        }
    }

    registry.update_test(test, |t| {
        t.dependencies.retain(|dep| targets.contains(dep));
        for dep in &targets {
            if !t.dependencies.contains(dep) {
                t.dependencies.push(*dep);
            }
        }
    })
}
