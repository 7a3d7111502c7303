//! Read-only views of registered tests for listing and export.

use serde::Serialize;

use crate::error::{Result, TrackerError};
use crate::links::{commit_url, test_tree_url};
use crate::registry::{Registry, TestDescriptor};

/// One registered test with its relations resolved to names.
#[derive(Debug, Clone, Serialize)]
pub struct TestRow {
    pub name: String,
    pub repository: Option<String>,
    pub folder: Option<String>,
    pub owner: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub time: Option<String>,
    pub enabled: bool,
    pub groups: Vec<String>,
    pub dependencies: Vec<String>,
    pub last_commit: Option<String>,
    pub version: Option<String>,
    pub url: Option<String>,
    pub commit_url: Option<String>,
}

/// Tests in the registry, optionally limited to one repository by name,
/// sorted by test name.
///
/// # Errors
///
/// Returns [`TrackerError::Registry`] if the named repository is unknown.
pub fn test_rows(registry: &Registry, repository: Option<&str>) -> Result<Vec<TestRow>> {
    let filter = match repository {
        Some(name) => Some(
            registry
                .repository_by_name(name)
                .map(|r| r.id)
                .ok_or_else(|| TrackerError::Registry(format!("Unknown repository '{name}'")))?,
        ),
        None => None,
    };

    let mut rows: Vec<TestRow> = registry
        .tests()
        .iter()
        .filter(|t| filter.is_none() || t.repository == filter)
        .map(|t| test_row(registry, t))
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(rows)
}

/// A group tag with the number of tests carrying it.
#[derive(Debug, Clone, Serialize)]
pub struct GroupRow {
    pub name: String,
    pub tests: usize,
}

pub fn group_rows(registry: &Registry) -> Vec<GroupRow> {
    registry
        .groups()
        .iter()
        .map(|group| GroupRow {
            name: group.name.clone(),
            tests: registry
                .tests()
                .iter()
                .filter(|t| t.groups.contains(&group.id))
                .count(),
        })
        .collect()
}

fn test_row(registry: &Registry, test: &TestDescriptor) -> TestRow {
    let repository = test.repository.and_then(|id| registry.repository(id));
    let web_url = repository.and_then(|r| r.web_url.as_deref());
    let latest = registry
        .history_of(test.id)
        .into_iter()
        .max_by_key(|entry| entry.date);

    TestRow {
        name: test.name.clone(),
        repository: repository.map(|r| r.name.clone()),
        folder: test.folder.clone(),
        owner: test
            .owner
            .and_then(|id| registry.author(id))
            .map(|a| format!("{} <{}>", a.name, a.email)),
        kind: test.kind.clone(),
        time: test.time.clone(),
        enabled: test.enabled,
        groups: test
            .groups
            .iter()
            .filter_map(|id| registry.group(*id))
            .map(|g| g.name.clone())
            .collect(),
        dependencies: test
            .dependencies
            .iter()
            .filter_map(|id| registry.test(*id))
            .map(|t| t.name.clone())
            .collect(),
        last_commit: latest.map(|entry| entry.commit.clone()),
        version: latest.and_then(|entry| entry.version.clone()),
        url: web_url
            .zip(test.folder.as_deref())
            .map(|(web, folder)| test_tree_url(web, folder)),
        commit_url: web_url
            .zip(latest)
            .map(|(web, entry)| commit_url(web, &entry.commit)),
    }
}
