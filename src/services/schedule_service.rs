use chrono::{DateTime, FixedOffset};
use tracing::{debug, info};

use crate::error::AppResult;
use crate::models::schedule::{
    Constraints, LogLevel, ScheduleLogEntry, ScheduleResult, TaskAllocationStatus, UnscheduledTask,
};
use crate::models::settings::SchedulerSettings;
use crate::models::task::{FixedEvent, Task};
use crate::services::allocator::Allocator;
use crate::services::block_merger::merge_blocks;
use crate::services::candidate_generator::generate_candidates;
use crate::services::free_intervals::compute_free_intervals;
use crate::services::priority_scorer::PriorityScorer;
use crate::services::schedule_utils;

pub const ALREADY_COMPLETED: &str = "already completed";

/// Runs free-time computation, candidate generation, allocation and block
/// merging over one snapshot of tasks and events.
///
/// `now` is frozen for the whole run so identical inputs give identical
/// results.
#[derive(Debug, Clone, Default)]
pub struct ScheduleService {
    settings: SchedulerSettings,
}

impl ScheduleService {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn generate_schedule(
        &self,
        tasks: &[Task],
        events: &[FixedEvent],
        constraints: &Constraints,
        now: DateTime<FixedOffset>,
    ) -> AppResult<ScheduleResult> {
        constraints.validate()?;
        self.settings.validate()?;

        let (open, done): (Vec<Task>, Vec<Task>) =
            tasks.iter().cloned().partition(|task| !task.is_completed);

        let free = compute_free_intervals(constraints, events);
        let candidates = generate_candidates(
            &free,
            constraints.max_study_minutes_per_block,
            &constraints.energy_profile,
        );
        debug!(
            target: "app::scheduler",
            days = free.len(),
            candidates = candidates.len(),
            tasks = open.len(),
            "candidates generated"
        );

        let scorer = PriorityScorer::new(
            &self.settings.priority_weights,
            now,
            constraints.horizon_days(),
        );
        let mut result = Allocator::new(constraints)
            .with_max_iterations(self.settings.max_allocation_iterations)
            .allocate(&open, candidates, &scorer);

        let placed = result.blocks.len();
        result.blocks = merge_blocks(std::mem::take(&mut result.blocks), &open, &free, constraints);
        if result.blocks.len() < placed {
            result.record(
                ScheduleLogEntry::new(
                    LogLevel::Debug,
                    "merge",
                    format!("merged {} adjacent blocks", placed - result.blocks.len()),
                )
                .with("before", placed)
                .with("after", result.blocks.len()),
            );
        }

        for task in done {
            result.task_status.insert(task.id.clone(), TaskAllocationStatus::Unscheduled);
            result.unscheduled_tasks.push(UnscheduledTask {
                task_id: task.id.clone(),
                title: task.title.clone(),
                reason: ALREADY_COMPLETED.to_string(),
            });
        }

        let scheduled_minutes: i64 = result.blocks.iter().map(|block| block.duration_minutes()).sum();
        result.record(
            ScheduleLogEntry::new(
                LogLevel::Info,
                "summary",
                format!(
                    "scheduled {} blocks ({} minutes), {} tasks unscheduled",
                    result.blocks.len(),
                    scheduled_minutes,
                    result.unscheduled_tasks.len()
                ),
            )
            .with("generatedAt", schedule_utils::format_datetime(now)),
        );
        info!(
            target: "app::scheduler",
            blocks = result.blocks.len(),
            scheduled_minutes,
            unscheduled = result.unscheduled_tasks.len(),
            "schedule generated"
        );

        Ok(result)
    }
}
