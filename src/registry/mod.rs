mod store;
mod types;

use serde::{Deserialize, Serialize};

pub use store::RegistryStore;
pub use types::{
    Author, AuthorId, CommitHistoryEntry, GroupId, GroupTag, HistoryDefaults, HistoryId, Recipe,
    RecipeId, Repository, RepositoryId, Task, TaskId, TaskResult, TestDescriptor, TestId,
    UserStatus,
};

/// Persistent record of repositories, tests, authors, commits and results.
///
/// Entities live in id-ordered arenas; relations (owner, groups, dependencies,
/// history, tasks) are stored as ids so the self-referential dependency graph
/// never forms ownership cycles. Ids are allocated from one monotonically
/// increasing counter, so arena order is creation order.
///
/// Every mutating method bumps the revision only when it actually changes
/// state; an unchanged revision after a sync means nothing was written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    next_id: u64,
    #[serde(skip)]
    revision: u64,
    #[serde(default)]
    repositories: Vec<Repository>,
    #[serde(default)]
    authors: Vec<Author>,
    #[serde(default)]
    groups: Vec<GroupTag>,
    #[serde(default)]
    tests: Vec<TestDescriptor>,
    #[serde(default)]
    history: Vec<CommitHistoryEntry>,
    #[serde(default)]
    recipes: Vec<Recipe>,
    #[serde(default)]
    tasks: Vec<Task>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of state changes since this registry was loaded or created.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    // Repositories

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    pub fn repository(&self, id: RepositoryId) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.id == id)
    }

    pub fn repository_by_name(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Finds a repository by normalized remote URL, renaming it when the
    /// checkout folder name changed.
    pub fn get_or_create_repository(&mut self, url: &str, name: &str) -> RepositoryId {
        if let Some(index) = self.repositories.iter().position(|r| r.url == url) {
            if self.repositories[index].name != name {
                self.repositories[index].name = name.to_string();
                self.touch();
            }
            return self.repositories[index].id;
        }

        let id = RepositoryId(self.allocate());
        self.repositories.push(Repository {
            id,
            name: name.to_string(),
            url: url.to_string(),
            web_url: None,
        });
        self.touch();
        id
    }

    pub fn set_repository_web_url(&mut self, id: RepositoryId, web_url: Option<String>) {
        let Some(repo) = self.repositories.iter_mut().find(|r| r.id == id) else {
            return;
        };
        if repo.web_url != web_url {
            repo.web_url = web_url;
            self.touch();
        }
    }

    // Authors

    pub fn authors(&self) -> &[Author] {
        &self.authors
    }

    pub fn author(&self, id: AuthorId) -> Option<&Author> {
        self.authors.iter().find(|a| a.id == id)
    }

    pub fn find_author(&self, predicate: impl Fn(&Author) -> bool) -> Option<AuthorId> {
        self.authors.iter().find(|a| predicate(a)).map(|a| a.id)
    }

    pub fn get_or_create_author(&mut self, email: &str, default_name: &str) -> AuthorId {
        if let Some(id) = self.find_author(|a| a.email == email) {
            return id;
        }

        let id = AuthorId(self.allocate());
        self.authors.push(Author {
            id,
            name: default_name.to_string(),
            email: email.to_string(),
        });
        self.touch();
        id
    }

    // Groups

    pub fn groups(&self) -> &[GroupTag] {
        &self.groups
    }

    pub fn get_or_create_group(&mut self, name: &str) -> GroupId {
        if let Some(group) = self.groups.iter().find(|g| g.name == name) {
            return group.id;
        }

        let id = GroupId(self.allocate());
        self.groups.push(GroupTag {
            id,
            name: name.to_string(),
        });
        self.touch();
        id
    }

    pub fn group(&self, id: GroupId) -> Option<&GroupTag> {
        self.groups.iter().find(|g| g.id == id)
    }

    // Tests

    pub fn tests(&self) -> &[TestDescriptor] {
        &self.tests
    }

    pub fn test(&self, id: TestId) -> Option<&TestDescriptor> {
        self.tests.iter().find(|t| t.id == id)
    }

    pub fn test_by_name(&self, name: &str) -> Option<&TestDescriptor> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Tests of a repository declared in `folder`, oldest first.
    pub fn tests_in_folder(&self, repository: RepositoryId, folder: &str) -> Vec<TestId> {
        self.tests
            .iter()
            .filter(|t| t.repository == Some(repository) && t.folder.as_deref() == Some(folder))
            .map(|t| t.id)
            .collect()
    }

    pub fn tests_of_repository(&self, repository: RepositoryId) -> Vec<TestId> {
        self.tests
            .iter()
            .filter(|t| t.repository == Some(repository))
            .map(|t| t.id)
            .collect()
    }

    /// Looks a test up by its globally unique name, creating it in
    /// `repository` when unknown. The flag is true for a new test.
    pub fn get_or_create_test(&mut self, name: &str, repository: RepositoryId) -> (TestId, bool) {
        if let Some(test) = self.test_by_name(name) {
            return (test.id, false);
        }

        let id = TestId(self.allocate());
        self.tests
            .push(TestDescriptor::new(id, name.to_string(), Some(repository)));
        self.touch();
        (id, true)
    }

    /// First test (lowest id) whose name ends with `suffix`.
    pub fn find_test_by_name_suffix(&self, suffix: &str) -> Option<TestId> {
        self.tests
            .iter()
            .find(|t| t.name.ends_with(suffix))
            .map(|t| t.id)
    }

    /// Applies `update` to a test, recording a write only if the test changed.
    pub fn update_test(&mut self, id: TestId, update: impl FnOnce(&mut TestDescriptor)) -> bool {
        let Some(test) = self.tests.iter_mut().find(|t| t.id == id) else {
            return false;
        };

        let before = test.clone();
        update(test);
        test.dependencies.retain(|dep| *dep != id);
        let changed = *test != before;
        if changed {
            self.touch();
        }
        changed
    }

    /// Removes a test together with every dependency edge pointing at it.
    pub fn delete_test(&mut self, id: TestId) {
        let before = self.tests.len();
        self.tests.retain(|t| t.id != id);
        if self.tests.len() == before {
            return;
        }
        for test in &mut self.tests {
            test.dependencies.retain(|dep| *dep != id);
        }
        self.touch();
    }

    // Commit history

    pub fn history(&self) -> &[CommitHistoryEntry] {
        &self.history
    }

    pub fn history_of(&self, test: TestId) -> Vec<&CommitHistoryEntry> {
        self.history.iter().filter(|h| h.test == test).collect()
    }

    /// Finds the entry for (`commit`, `test`) or creates it from `defaults`.
    /// Existing entries are never modified. The flag is true for a new entry.
    pub fn get_or_create_history(
        &mut self,
        commit: &str,
        test: TestId,
        defaults: HistoryDefaults,
    ) -> (HistoryId, bool) {
        if let Some(entry) = self
            .history
            .iter()
            .find(|h| h.commit == commit && h.test == test)
        {
            return (entry.id, false);
        }

        let id = HistoryId(self.allocate());
        self.history.push(CommitHistoryEntry {
            id,
            commit: commit.to_string(),
            test,
            version: defaults.version,
            date: defaults.date,
            author: defaults.author,
        });
        self.touch();
        (id, true)
    }

    pub(crate) fn reassign_history(&mut self, id: HistoryId, test: TestId) {
        let Some(entry) = self.history.iter_mut().find(|h| h.id == id) else {
            return;
        };
        if entry.test != test {
            entry.test = test;
            self.touch();
        }
    }

    pub(crate) fn delete_history(&mut self, id: HistoryId) {
        let before = self.history.len();
        self.history.retain(|h| h.id != id);
        if self.history.len() != before {
            self.touch();
        }
    }

    // Recipes and tasks

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn recipe(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.id == id)
    }

    pub fn recipe_by_uid(&self, uid: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.uid == uid)
    }

    pub fn get_or_create_recipe(&mut self, uid: &str, whiteboard: &str) -> RecipeId {
        if let Some(recipe) = self.recipe_by_uid(uid) {
            return recipe.id;
        }

        let id = RecipeId(self.allocate());
        self.recipes.push(Recipe {
            id,
            uid: uid.to_string(),
            whiteboard: whiteboard.to_string(),
            result: TaskResult::Unknown,
            result_rate: -1,
            status_by_user: UserStatus::None,
        });
        self.touch();
        id
    }

    pub fn update_recipe(&mut self, id: RecipeId, update: impl FnOnce(&mut Recipe)) -> bool {
        let Some(recipe) = self.recipes.iter_mut().find(|r| r.id == id) else {
            return false;
        };

        let before = recipe.clone();
        update(recipe);
        let changed = *recipe != before;
        if changed {
            self.touch();
        }
        changed
    }

    pub fn task_by_uid(&self, uid: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.uid == uid)
    }

    /// Tasks of a recipe ordered by external task id.
    pub fn tasks_of(&self, recipe: RecipeId) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().filter(|t| t.recipe == recipe).collect();
        tasks.sort_by(|a, b| a.uid.cmp(&b.uid));
        tasks
    }

    /// Records the result of a task, creating the task on first report.
    pub fn upsert_task(
        &mut self,
        uid: &str,
        recipe: RecipeId,
        test: TestId,
        result: TaskResult,
    ) -> TaskId {
        if let Some(index) = self.tasks.iter().position(|t| t.uid == uid) {
            let task = &mut self.tasks[index];
            let id = task.id;
            if task.recipe != recipe || task.test != test || task.result != result {
                task.recipe = recipe;
                task.test = test;
                task.result = result;
                self.touch();
            }
            return id;
        }

        let id = TaskId(self.allocate());
        self.tasks.push(Task {
            id,
            uid: uid.to_string(),
            recipe,
            test,
            result,
            status_by_user: UserStatus::None,
        });
        self.touch();
        id
    }

    pub fn set_task_status(&mut self, id: TaskId, status: UserStatus) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        if task.status_by_user == status {
            return false;
        }
        task.status_by_user = status;
        self.touch();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_creation_order() {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let (a, _) = registry.get_or_create_test("/a", repo);
        let (b, _) = registry.get_or_create_test("/b", repo);

        assert!(a < b);
        assert_eq!(registry.tests()[0].id, a);
    }

    #[test]
    fn test_get_or_create_test_reuses_name() {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let (first, created) = registry.get_or_create_test("/CoreOS/bash/smoke", repo);
        let (second, created_again) = registry.get_or_create_test("/CoreOS/bash/smoke", repo);

        assert!(created);
        assert!(!created_again);
        assert_eq!(first, second);
        assert_eq!(registry.tests().len(), 1);
    }

    #[test]
    fn test_update_test_counts_only_real_changes() {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let (id, _) = registry.get_or_create_test("/a", repo);
        let revision = registry.revision();

        assert!(!registry.update_test(id, |t| t.enabled = true));
        assert_eq!(registry.revision(), revision);

        assert!(registry.update_test(id, |t| t.description = Some("smoke".into())));
        assert_eq!(registry.revision(), revision + 1);
    }

    #[test]
    fn test_suffix_match_prefers_lowest_id() {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let (first, _) = registry.get_or_create_test("/CoreOS/bash/Library/common", repo);
        let (second, _) = registry.get_or_create_test("/CoreOS/zsh/Library/common", repo);
        registry.get_or_create_test("/CoreOS/bash/Sanity/smoke", repo);

        assert_eq!(registry.find_test_by_name_suffix("/Library/common"), Some(first));
        assert_eq!(registry.find_test_by_name_suffix("zsh/Library/common"), Some(second));
        assert_eq!(registry.find_test_by_name_suffix("/Library/missing"), None);
    }

    #[test]
    fn test_web_url_change_bumps_revision_once() {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let revision = registry.revision();

        let url = Some("https://git.example.com/cgit/tests".to_string());
        registry.set_repository_web_url(repo, url.clone());
        registry.set_repository_web_url(repo, url);

        assert_eq!(registry.revision(), revision + 1);
    }

    #[test]
    fn test_update_test_drops_self_dependency() {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let (id, _) = registry.get_or_create_test("/a", repo);

        registry.update_test(id, |t| t.dependencies.push(id));

        assert!(registry.test(id).unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_delete_test_removes_incoming_edges() {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let (a, _) = registry.get_or_create_test("/a", repo);
        let (b, _) = registry.get_or_create_test("/b", repo);
        registry.update_test(a, |t| t.dependencies.push(b));

        registry.delete_test(b);

        assert!(registry.test(b).is_none());
        assert!(registry.test(a).unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_history_is_unique_per_commit_and_test() {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let (test, _) = registry.get_or_create_test("/a", repo);
        let defaults = HistoryDefaults {
            version: Some("1_0-1".into()),
            date: chrono::Utc::now(),
            author: None,
        };

        let (first, created) = registry.get_or_create_history("abc", test, defaults.clone());
        let (second, created_again) = registry.get_or_create_history(
            "abc",
            test,
            HistoryDefaults {
                version: Some("2_0-1".into()),
                ..defaults
            },
        );

        assert!(created);
        assert!(!created_again);
        assert_eq!(first, second);
        assert_eq!(registry.history()[0].version.as_deref(), Some("1_0-1"));
    }

    #[test]
    fn test_repository_rename_on_folder_change() {
        let mut registry = Registry::new();
        let first = registry.get_or_create_repository("git.example.com/tests", "tests");
        let second = registry.get_or_create_repository("git.example.com/tests", "tests-new");

        assert_eq!(first, second);
        assert_eq!(registry.repository(first).unwrap().name, "tests-new");
    }

    #[test]
    fn test_tasks_of_orders_by_uid() {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let (test, _) = registry.get_or_create_test("/a", repo);
        let recipe = registry.get_or_create_recipe("R:1", "nightly");
        registry.upsert_task("T:3", recipe, test, TaskResult::Pass);
        registry.upsert_task("T:1", recipe, test, TaskResult::Fail);
        registry.upsert_task("T:2", recipe, test, TaskResult::Pass);

        let uids: Vec<&str> = registry
            .tasks_of(recipe)
            .iter()
            .map(|t| t.uid.as_str())
            .collect();
        assert_eq!(uids, vec!["T:1", "T:2", "T:3"]);
    }

    #[test]
    fn test_registry_json_roundtrip_keeps_relations() {
        let mut registry = Registry::new();
        let repo = registry.get_or_create_repository("git.example.com/tests", "tests");
        let (a, _) = registry.get_or_create_test("/a", repo);
        let (b, _) = registry.get_or_create_test("/b", repo);
        registry.update_test(a, |t| t.dependencies.push(b));

        let json = serde_json::to_string(&registry).unwrap();
        let reloaded: Registry = serde_json::from_str(&json).unwrap();

        assert_eq!(reloaded.test(a).unwrap().dependencies, vec![b]);
        assert_eq!(reloaded.revision(), 0);
        let (c, _) = {
            let mut reloaded = reloaded;
            reloaded.get_or_create_test("/c", repo)
        };
        assert!(c > b);
    }
}
