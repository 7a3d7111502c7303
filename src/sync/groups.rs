use crate::registry::{GroupId, Registry, TestId};

use super::makefile::FieldValue;

/// Group tags known at the start of a reconciliation batch.
///
/// Loaded once per checkout pass and passed explicitly to every test's
/// group update, so one batch never sees groups created halfway through.
pub struct GroupCache {
    groups: Vec<(GroupId, String)>,
}

impl GroupCache {
    pub fn load(registry: &Registry) -> Self {
        Self {
            groups: registry
                .groups()
                .iter()
                .map(|g| (g.id, g.name.clone()))
                .collect(),
        }
    }

    /// Groups whose name occurs anywhere in the `RunFor` value.
    pub fn matching(&self, run_for: &FieldValue) -> Vec<GroupId> {
        let haystack = run_for.joined();
        self.groups
            .iter()
            .filter(|(_, name)| haystack.contains(name.as_str()))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Brings the test's groups in line with `RunFor`: unwanted groups are
    /// removed, wanted groups appended, and kept groups stay in place.
    ///
    /// A `RunFor` that matches no known group leaves the test untouched.
    pub fn apply(&self, registry: &mut Registry, test: TestId, run_for: &FieldValue) -> bool {
        let wanted = self.matching(run_for);
        if wanted.is_empty() {
            return false;
        }

        registry.update_test(test, |t| {
            t.groups.retain(|g| wanted.contains(g));
            for group in &wanted {
                if !t.groups.contains(group) {
                    t.groups.push(*group);
                }
            }
        })
    }
}
