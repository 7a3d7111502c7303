use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! registry_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

registry_id!(RepositoryId);
registry_id!(AuthorId);
registry_id!(GroupId);
registry_id!(TestId);
registry_id!(HistoryId);
registry_id!(RecipeId);
registry_id!(TaskId);

/// A source repository holding test Makefiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    /// Basename of the checkout folder
    pub name: String,
    /// Remote URL without scheme or credentials (e.g., "git.example.com/tests.git")
    pub url: String,
    /// Optional gitweb-style base used to build links
    pub web_url: Option<String>,
}

/// A person credited with owning a test or authoring a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    pub email: String,
}

/// An organizational ownership group matched against the `RunFor` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTag {
    pub id: GroupId,
    pub name: String,
}

/// A test discovered from a Makefile descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDescriptor {
    pub id: TestId,
    /// Globally unique test name (e.g., "/CoreOS/bash/Sanity/smoke")
    pub name: String,
    pub repository: Option<RepositoryId>,
    /// Path of the test within its repository
    pub folder: Option<String>,
    pub owner: Option<AuthorId>,
    pub description: Option<String>,
    /// Declared duration budget (e.g., "10m")
    pub time: Option<String>,
    /// Category tag from the `Type` field
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub enabled: bool,
    pub groups: Vec<GroupId>,
    /// Tests this test requires; never contains `id`
    pub dependencies: Vec<TestId>,
}

impl TestDescriptor {
    pub fn new(id: TestId, name: String, repository: Option<RepositoryId>) -> Self {
        Self {
            id,
            name,
            repository,
            folder: None,
            owner: None,
            description: None,
            time: None,
            kind: None,
            enabled: true,
            groups: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

/// One observed commit touching a test's folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitHistoryEntry {
    pub id: HistoryId,
    pub commit: String,
    pub test: TestId,
    /// Release version extracted from a decorated tag
    pub version: Option<String>,
    pub date: DateTime<Utc>,
    pub author: Option<AuthorId>,
}

/// Values written when a history entry is created.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryDefaults {
    pub version: Option<String>,
    pub date: DateTime<Utc>,
    pub author: Option<AuthorId>,
}

/// Outcome of a task or recipe as reported by the test-execution system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskResult {
    #[default]
    Unknown,
    Aborted,
    Cancelled,
    Waiting,
    Scheduled,
    New,
    Warn,
    Fail,
    Pass,
    Panic,
    FailInstall,
}

static RESULT_NAMES: LazyLock<HashMap<&'static str, TaskResult>> = LazyLock::new(|| {
    HashMap::from([
        ("unknown", TaskResult::Unknown),
        ("unknow", TaskResult::Unknown),
        ("aborted", TaskResult::Aborted),
        ("cancelled", TaskResult::Cancelled),
        ("waiting", TaskResult::Waiting),
        ("scheduled", TaskResult::Scheduled),
        ("new", TaskResult::New),
        ("warn", TaskResult::Warn),
        ("warning", TaskResult::Warn),
        ("fail", TaskResult::Fail),
        ("pass", TaskResult::Pass),
        ("panic", TaskResult::Panic),
        ("failinstall", TaskResult::FailInstall),
    ])
});

impl TaskResult {
    /// Case-insensitive lookup of a result name, accepting legacy aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        RESULT_NAMES.get(name.trim().to_lowercase().as_str()).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
            Self::Waiting => "waiting",
            Self::Scheduled => "scheduled",
            Self::New => "new",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Pass => "pass",
            Self::Panic => "panic",
            Self::FailInstall => "failinstall",
        }
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manual override applied by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    None,
    Waived,
}

/// A machine run grouping an ordered set of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    /// External recipe id (e.g., "R:1234")
    pub uid: String,
    pub whiteboard: String,
    pub result: TaskResult,
    /// Percentage of passed or waived tasks; -1 until first computed
    pub result_rate: i32,
    pub status_by_user: UserStatus,
}

impl Recipe {
    /// Result shown to users: a waived recipe reads as "waived".
    pub fn display_result(&self) -> &'static str {
        match self.status_by_user {
            UserStatus::Waived => "waived",
            UserStatus::None => self.result.as_str(),
        }
    }
}

/// One test execution inside a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// External task id; ordering key within a recipe
    pub uid: String,
    pub recipe: RecipeId,
    pub test: TestId,
    pub result: TaskResult,
    pub status_by_user: UserStatus,
}

impl Task {
    pub fn is_waived(&self) -> bool {
        self.status_by_user == UserStatus::Waived
    }
}
