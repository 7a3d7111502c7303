use log::{debug, info};
use serde::Serialize;

use crate::error::{Result, TrackerError};
use crate::registry::{RecipeId, Registry, TaskResult, UserStatus};

/// The parts of a task the aggregation looks at.
#[derive(Debug, Clone, Copy)]
pub struct TaskView<'a> {
    pub result: TaskResult,
    pub waived: bool,
    pub test_name: &'a str,
}

/// Recipe-level outcome computed from its tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    /// New recipe result; `None` for a recipe without tasks
    pub result: Option<TaskResult>,
    /// Percentage of passed or waived tasks
    pub result_rate: i32,
    /// Whether the whole recipe becomes user-waived
    pub waive: bool,
}

/// Rolls task results up into a recipe outcome.
///
/// `tasks` must be ordered by external task id: the first task is the
/// installation task, and a failure there marks the recipe as failinstall
/// whatever the remaining tasks did. Waived tasks count as passed. Otherwise
/// the recipe result is the first unwaived warn or fail, or pass. Once any
/// task is waived, a recipe that only waits on the reserve-system task after
/// every other task passed is waived as a whole.
pub fn aggregate(tasks: &[TaskView<'_>], reserve_test: &str) -> Aggregate {
    let install_failed = tasks.first().is_some_and(|first| {
        matches!(
            first.result,
            TaskResult::Fail | TaskResult::Warn | TaskResult::Aborted
        )
    });

    let mut total = 0;
    let mut passed_or_waived = 0;
    let mut any_waived = false;
    let mut failing: Vec<TaskResult> = Vec::new();
    let mut running: Option<&TaskView<'_>> = None;

    for task in tasks {
        total += 1;
        if task.result == TaskResult::Pass || task.waived {
            passed_or_waived += 1;
        }
        if task.waived {
            any_waived = true;
        }
        if matches!(task.result, TaskResult::Warn | TaskResult::Fail) && !task.waived {
            failing.push(task.result);
        }
        if task.result == TaskResult::New && running.is_none() {
            running = Some(task);
        }
    }

    let mut result = (total > 0).then(|| failing.first().copied().unwrap_or(TaskResult::Pass));
    let mut waive = false;

    if any_waived
        && running.is_some_and(|task| task.test_name == reserve_test)
        && passed_or_waived + 1 == total
    {
        waive = true;
    }

    let result_rate = if total > 0 {
        passed_or_waived * 100 / total
    } else {
        0
    };

    if any_waived && passed_or_waived == total {
        waive = true;
    }

    if install_failed {
        result = Some(TaskResult::FailInstall);
    }

    Aggregate {
        result,
        result_rate,
        waive,
    }
}

/// Result of recounting one recipe.
#[derive(Debug, Clone, Serialize)]
pub struct RecountOutcome {
    pub uid: String,
    pub result: String,
    pub result_rate: i32,
    pub changed: bool,
}

/// Recomputes a recipe's result, rate and waiver from its tasks and stores
/// them in the registry.
pub fn recount_recipe(
    registry: &mut Registry,
    recipe: RecipeId,
    reserve_test: &str,
) -> Result<RecountOutcome> {
    let outcome = {
        let tasks: Vec<TaskView<'_>> = registry
            .tasks_of(recipe)
            .into_iter()
            .map(|task| TaskView {
                result: task.result,
                waived: task.is_waived(),
                test_name: registry.test(task.test).map_or("", |t| t.name.as_str()),
            })
            .collect();
        aggregate(&tasks, reserve_test)
    };

    let changed = registry.update_recipe(recipe, |r| {
        if let Some(result) = outcome.result {
            r.result = result;
        }
        r.result_rate = outcome.result_rate;
        if outcome.waive {
            r.status_by_user = UserStatus::Waived;
        }
    });

    let recipe = registry
        .recipe(recipe)
        .ok_or_else(|| TrackerError::Registry(format!("Unknown recipe id {recipe}")))?;

    debug!(
        "Recipe {}: {} ({}%)",
        recipe.uid,
        recipe.display_result(),
        recipe.result_rate
    );

    Ok(RecountOutcome {
        uid: recipe.uid.clone(),
        result: recipe.display_result().to_string(),
        result_rate: recipe.result_rate,
        changed,
    })
}

/// Waives one task and recounts its recipe.
pub fn waive_task(registry: &mut Registry, task_uid: &str, reserve_test: &str) -> Result<RecountOutcome> {
    let task = registry
        .task_by_uid(task_uid)
        .ok_or_else(|| TrackerError::Registry(format!("Unknown task {task_uid}")))?;
    let (task_id, recipe) = (task.id, task.recipe);

    if registry.set_task_status(task_id, UserStatus::Waived) {
        info!("Task {task_uid} waived");
    }

    recount_recipe(registry, recipe, reserve_test)
}

/// A task result reported by the test-execution system.
#[derive(Debug, Clone)]
pub struct TaskReport<'a> {
    pub recipe_uid: &'a str,
    pub whiteboard: &'a str,
    pub task_uid: &'a str,
    pub test_name: &'a str,
    pub result: &'a str,
}

/// Records a task result and recounts the recipe it belongs to.
///
/// # Errors
///
/// Fails for an unknown result name or a test that is not registered.
pub fn report_task(
    registry: &mut Registry,
    report: &TaskReport<'_>,
    reserve_test: &str,
) -> Result<RecountOutcome> {
    let result = TaskResult::from_name(report.result)
        .ok_or_else(|| TrackerError::Registry(format!("Unknown result '{}'", report.result)))?;
    let test = registry
        .test_by_name(report.test_name)
        .map(|t| t.id)
        .ok_or_else(|| TrackerError::Registry(format!("Unknown test '{}'", report.test_name)))?;

    let recipe = registry.get_or_create_recipe(report.recipe_uid, report.whiteboard);
    registry.upsert_task(report.task_uid, recipe, test, result);

    recount_recipe(registry, recipe, reserve_test)
}
