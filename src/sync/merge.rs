use std::collections::HashSet;

use crate::registry::{HistoryId, Registry, TestId};

/// A history entry as seen before the merge.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    pub id: HistoryId,
    pub test: TestId,
    pub commit: String,
}

/// A test that depends on at least one of the merge candidates.
#[derive(Debug, Clone)]
pub struct DependentSnapshot {
    pub test: TestId,
    pub dependencies: Vec<TestId>,
}

/// New dependency list for a test that pointed at a duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRewrite {
    pub test: TestId,
    pub dependencies: Vec<TestId>,
}

/// How to collapse several registry rows for one test folder into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// Oldest row; survives the merge
    pub canonical: TestId,
    /// Duplicate history entries re-pointed to the canonical test
    pub history_moves: Vec<HistoryId>,
    /// Duplicate history entries whose commit the canonical test already has
    pub history_drops: Vec<HistoryId>,
    pub rewrites: Vec<DependencyRewrite>,
    /// Duplicate rows to delete
    pub deletions: Vec<TestId>,
}

/// Plans the collapse of `candidates` (rows sharing one folder) into the
/// oldest of them. Returns `None` when there is nothing to merge.
///
/// Each commit ends up at most once on the canonical test, and every
/// dependency on a duplicate becomes a dependency on the canonical test
/// (never on itself, never twice).
pub fn plan_duplicate_merge(
    candidates: &[TestId],
    history: &[HistorySnapshot],
    dependents: &[DependentSnapshot],
) -> Option<MergePlan> {
    let mut ordered = candidates.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    if ordered.len() < 2 {
        return None;
    }

    let canonical = ordered[0];
    let duplicates = &ordered[1..];

    let mut commits: HashSet<&str> = history
        .iter()
        .filter(|h| h.test == canonical)
        .map(|h| h.commit.as_str())
        .collect();
    let mut history_moves = Vec::new();
    let mut history_drops = Vec::new();

    for duplicate in duplicates {
        for entry in history.iter().filter(|h| h.test == *duplicate) {
            if commits.insert(entry.commit.as_str()) {
                history_moves.push(entry.id);
            } else {
                history_drops.push(entry.id);
            }
        }
    }

    let rewrites = dependents
        .iter()
        .filter(|dependent| !duplicates.contains(&dependent.test))
        .filter(|dependent| dependent.dependencies.iter().any(|d| duplicates.contains(d)))
        .map(|dependent| {
            let mut dependencies = Vec::new();
            for dep in &dependent.dependencies {
                let target = if duplicates.contains(dep) { canonical } else { *dep };
                if target != dependent.test && !dependencies.contains(&target) {
                    dependencies.push(target);
                }
            }
            DependencyRewrite {
                test: dependent.test,
                dependencies,
            }
        })
        .collect();

    Some(MergePlan {
        canonical,
        history_moves,
        history_drops,
        rewrites,
        deletions: duplicates.to_vec(),
    })
}

/// Snapshots the registry rows relevant to merging `candidates` and plans it.
pub fn plan_for(registry: &Registry, candidates: &[TestId]) -> Option<MergePlan> {
    let history: Vec<HistorySnapshot> = registry
        .history()
        .iter()
        .filter(|h| candidates.contains(&h.test))
        .map(|h| HistorySnapshot {
            id: h.id,
            test: h.test,
            commit: h.commit.clone(),
        })
        .collect();

    let dependents: Vec<DependentSnapshot> = registry
        .tests()
        .iter()
        .filter(|t| t.dependencies.iter().any(|d| candidates.contains(d)))
        .map(|t| DependentSnapshot {
            test: t.id,
            dependencies: t.dependencies.clone(),
        })
        .collect();

    plan_duplicate_merge(candidates, &history, &dependents)
}

/// Applies a merge plan to the registry.
pub fn apply(registry: &mut Registry, plan: &MergePlan) {
    for id in &plan.history_moves {
        registry.reassign_history(*id, plan.canonical);
    }
    for id in &plan.history_drops {
        registry.delete_history(*id);
    }
    for rewrite in &plan.rewrites {
        registry.update_test(rewrite.test, |t| {
            t.dependencies.clone_from(&rewrite.dependencies);
        });
    }
    for id in &plan.deletions {
        registry.delete_test(*id);
    }
}
