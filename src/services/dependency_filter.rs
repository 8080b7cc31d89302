//! Keeps tasks whose plan prerequisites are still open out of a schedule.
//!
//! A plan node counts as done when it is marked complete or when the task it
//! is bound to is completed. A stored plan that no longer forms a valid graph
//! holds back only the tasks it covers, with a `plan invalid` reason.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::plan::{Plan, PlanNode};
use crate::models::schedule::{
    Constraints, LogLevel, ScheduleLogEntry, ScheduleResult, ScheduledBlock, TaskAllocationStatus,
    UnscheduledTask,
};
use crate::models::settings::SchedulerSettings;
use crate::models::task::{FixedEvent, Task};
use crate::services::plan_graph::PlanGraph;
use crate::services::plan_graph_cache::PlanGraphCache;
use crate::services::plan_store::PlanStore;
use crate::services::schedule_service::{ScheduleService, ALREADY_COMPLETED};

const CATEGORY: &str = "dependency";

/// Tasks split into the ones that may be scheduled now and the ones held back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulableTasks {
    pub schedulable: Vec<Task>,
    pub excluded: Vec<UnscheduledTask>,
}

pub struct DependencyFilter {
    store: Arc<dyn PlanStore>,
    cache: PlanGraphCache,
    enforce: bool,
}

impl DependencyFilter {
    pub fn new(store: Arc<dyn PlanStore>, settings: &SchedulerSettings) -> Self {
        Self {
            store,
            cache: PlanGraphCache::new(settings.graph_cache_capacity),
            enforce: settings.enforce_dependencies,
        }
    }

    pub fn store(&self) -> &Arc<dyn PlanStore> {
        &self.store
    }

    pub fn get_schedulable_tasks(&self, tasks: &[Task]) -> AppResult<SchedulableTasks> {
        let completed = completed_ids(tasks, None);
        let mut split = SchedulableTasks::default();

        for task in tasks {
            if task.is_completed {
                split.excluded.push(excluded(task, ALREADY_COMPLETED.to_string()));
                continue;
            }
            match self.blocked_by(task, tasks, &completed)? {
                None => split.schedulable.push(task.clone()),
                Some(reason) => split.excluded.push(excluded(task, reason)),
            }
        }

        debug!(
            target: "app::dependency",
            schedulable = split.schedulable.len(),
            excluded = split.excluded.len(),
            "filtered tasks by plan dependencies"
        );
        Ok(split)
    }

    /// Tasks that became schedulable because `completed_task_id` finished.
    ///
    /// Graphs are rebuilt from the stored plans here rather than served from
    /// the cache. Each task id appears at most once.
    pub fn get_newly_unblocked_tasks(
        &self,
        completed_task_id: &str,
        tasks: &[Task],
    ) -> AppResult<Vec<String>> {
        let completed = completed_ids(tasks, Some(completed_task_id));
        let mut unblocked: Vec<String> = Vec::new();

        for task in tasks {
            if completed.contains(task.id.as_str()) || unblocked.contains(&task.id) {
                continue;
            }
            let Some(plan) = self.enforced_plan(&task.id)? else {
                continue;
            };
            let graph = match PlanGraph::from_plan(&plan) {
                Ok(graph) => graph,
                Err(err) => {
                    warn!(
                        target: "app::dependency",
                        plan_id = %plan.id,
                        task_id = %task.id,
                        code = err.code(),
                        "skipping invalid plan: {err}"
                    );
                    continue;
                }
            };
            let (Some(done_node), Some(task_node)) = (
                graph.node_for_assignment(completed_task_id),
                graph.node_for_assignment(&task.id),
            ) else {
                continue;
            };

            let depends_on_done = graph
                .get_dependents(&done_node.id)
                .iter()
                .any(|dependent| dependent.id == task_node.id);
            let all_done = graph
                .get_prerequisites(&task_node.id)
                .iter()
                .all(|node| is_done(node, &completed));
            if depends_on_done && all_done {
                unblocked.push(task.id.clone());
            }
        }

        if !unblocked.is_empty() {
            info!(
                target: "app::dependency",
                completed_task_id,
                unblocked = ?unblocked,
                "tasks unblocked"
            );
        }
        Ok(unblocked)
    }

    /// A block stays valid while its task exists, is open and is not blocked.
    pub fn is_scheduled_block_valid(&self, block: &ScheduledBlock, tasks: &[Task]) -> AppResult<bool> {
        Ok(self.invalid_reason(block, tasks)?.is_none())
    }

    /// Drops blocks that went stale since `result` was produced. A task left
    /// without any block is moved to the unscheduled list.
    pub fn remove_invalid_blocks(
        &self,
        mut result: ScheduleResult,
        tasks: &[Task],
    ) -> AppResult<ScheduleResult> {
        let mut kept = Vec::with_capacity(result.blocks.len());
        let mut dropped: Vec<(String, String)> = Vec::new();

        for block in std::mem::take(&mut result.blocks) {
            match self.invalid_reason(&block, tasks)? {
                None => kept.push(block),
                Some(reason) => {
                    if !dropped.iter().any(|(task_id, _)| *task_id == block.task_id) {
                        dropped.push((block.task_id.clone(), reason));
                    }
                }
            }
        }
        result.blocks = kept;

        for (task_id, reason) in dropped {
            let title = tasks
                .iter()
                .find(|task| task.id == task_id)
                .map_or_else(|| task_id.clone(), |task| task.title.clone());
            result.record(
                ScheduleLogEntry::new(
                    LogLevel::Info,
                    CATEGORY,
                    format!("removed stale blocks of \"{}\": {}", title, reason),
                )
                .with("taskId", &task_id),
            );
            if result.blocks_for_task(&task_id).next().is_none() && !result.is_unscheduled(&task_id) {
                result
                    .task_status
                    .insert(task_id.clone(), TaskAllocationStatus::Unscheduled);
                result.unscheduled_tasks.push(UnscheduledTask {
                    task_id,
                    title,
                    reason,
                });
            }
        }
        Ok(result)
    }

    pub fn get_blocked_reason(&self, task_id: &str, tasks: &[Task]) -> AppResult<Option<String>> {
        let Some(task) = tasks.iter().find(|task| task.id == task_id) else {
            return Ok(None);
        };
        if task.is_completed {
            return Ok(None);
        }
        self.blocked_by(task, tasks, &completed_ids(tasks, None))
    }

    /// Schedules the unblocked tasks and reports every held-back task as
    /// unscheduled, so each input task shows up exactly once.
    pub fn generate_dependency_aware_schedule(
        &self,
        scheduler: &ScheduleService,
        tasks: &[Task],
        events: &[FixedEvent],
        constraints: &Constraints,
        now: DateTime<FixedOffset>,
    ) -> AppResult<ScheduleResult> {
        let split = self.get_schedulable_tasks(tasks)?;
        let mut result = scheduler.generate_schedule(&split.schedulable, events, constraints, now)?;

        for entry in split.excluded {
            result.record(
                ScheduleLogEntry::new(
                    LogLevel::Info,
                    CATEGORY,
                    format!("\"{}\" not scheduled: {}", entry.title, entry.reason),
                )
                .with("taskId", &entry.task_id),
            );
            result
                .task_status
                .insert(entry.task_id.clone(), TaskAllocationStatus::Unscheduled);
            result.unscheduled_tasks.push(entry);
        }
        Ok(result)
    }

    /// Marks every node bound to `task_id` complete, saves the plan and
    /// returns the tasks this unblocked.
    pub fn complete_task(
        &self,
        task_id: &str,
        at: DateTime<FixedOffset>,
        tasks: &[Task],
    ) -> AppResult<Vec<String>> {
        if let Some(mut plan) = self.store.get_plan(task_id)? {
            let mut graph = PlanGraph::from_plan(&plan)?;
            let bound: Vec<String> = graph
                .ordered_nodes()
                .into_iter()
                .filter(|node| node.assignment_id.as_deref() == Some(task_id))
                .map(|node| node.id.clone())
                .collect();
            for node_id in &bound {
                graph.mark_node_completed(node_id, at)?;
            }
            if !bound.is_empty() {
                graph.write_into(&mut plan);
                self.cache.invalidate(&plan.id);
                self.store.save_plan(plan)?;
                debug!(
                    target: "app::dependency",
                    task_id,
                    nodes = bound.len(),
                    "plan nodes completed"
                );
            }
        }
        self.get_newly_unblocked_tasks(task_id, tasks)
    }

    fn enforced_plan(&self, task_id: &str) -> AppResult<Option<Plan>> {
        if !self.enforce {
            return Ok(None);
        }
        Ok(self
            .store
            .get_plan(task_id)?
            .filter(|plan| plan.enforce_dependencies))
    }

    fn open_prerequisites(&self, task: &Task, completed: &HashSet<&str>) -> AppResult<Vec<PlanNode>> {
        let Some(plan) = self.enforced_plan(&task.id)? else {
            return Ok(Vec::new());
        };
        let graph = self.cache.get_or_build(&plan)?;
        let Some(node) = graph.node_for_assignment(&task.id) else {
            return Ok(Vec::new());
        };
        Ok(graph
            .get_prerequisites(&node.id)
            .into_iter()
            .filter(|prerequisite| !is_done(prerequisite, completed))
            .cloned()
            .collect())
    }

    fn invalid_reason(&self, block: &ScheduledBlock, tasks: &[Task]) -> AppResult<Option<String>> {
        let Some(task) = tasks.iter().find(|task| task.id == block.task_id) else {
            return Ok(Some("task no longer exists".to_string()));
        };
        if task.is_completed {
            return Ok(Some(ALREADY_COMPLETED.to_string()));
        }
        self.blocked_by(task, tasks, &completed_ids(tasks, None))
    }

    /// Why `task` cannot run yet, if anything holds it back. Graph errors in
    /// its plan become a reason for this task alone; store errors propagate.
    fn blocked_by(
        &self,
        task: &Task,
        tasks: &[Task],
        completed: &HashSet<&str>,
    ) -> AppResult<Option<String>> {
        match self.open_prerequisites(task, completed) {
            Ok(open) => Ok((!open.is_empty()).then(|| describe_blockers(&open, tasks))),
            Err(AppError::Graph(err)) => {
                warn!(
                    target: "app::dependency",
                    task_id = %task.id,
                    code = err.code(),
                    "plan invalid: {err}"
                );
                Ok(Some(format!("plan invalid: {err}")))
            }
            Err(err) => Err(err),
        }
    }
}

fn completed_ids<'a>(tasks: &'a [Task], extra: Option<&'a str>) -> HashSet<&'a str> {
    tasks
        .iter()
        .filter(|task| task.is_completed)
        .map(|task| task.id.as_str())
        .chain(extra)
        .collect()
}

fn is_done(node: &PlanNode, completed: &HashSet<&str>) -> bool {
    node.is_completed
        || node
            .assignment_id
            .as_deref()
            .map_or(false, |task_id| completed.contains(task_id))
}

fn describe_blockers(open: &[PlanNode], tasks: &[Task]) -> String {
    match open {
        [single] => {
            let title = single
                .assignment_id
                .as_deref()
                .and_then(|task_id| tasks.iter().find(|task| task.id == task_id))
                .map_or(single.title.as_str(), |task| task.title.as_str());
            format!("Waiting on \"{}\"", title)
        }
        _ => format!("Waiting on {} prerequisites", open.len()),
    }
}

fn excluded(task: &Task, reason: String) -> UnscheduledTask {
    UnscheduledTask {
        task_id: task.id.clone(),
        title: task.title.clone(),
        reason,
    }
}
