//! Greedy packing of prioritized tasks into candidate blocks.
//!
//! Tasks are placed one at a time, highest priority first. Each placement
//! consumes candidate time in place, so later tasks only see what earlier
//! tasks left behind.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::schedule::{
    CandidateBlock, Constraints, LogLevel, ScheduleLogEntry, ScheduleResult, ScheduledBlock,
    TaskAllocationStatus, UnscheduledTask, MIN_FEASIBLE_MINUTES,
};
use crate::models::settings::DEFAULT_MAX_ALLOCATION_ITERATIONS;
use crate::models::task::Task;
use crate::services::priority_scorer::PriorityScorer;
use crate::services::schedule_utils;

pub const PRIORITY_WEIGHT: f64 = 1.0;
pub const ENERGY_WEIGHT: f64 = 0.5;
pub const LATENESS_WEIGHT: f64 = 0.5;

const CATEGORY: &str = "allocation";

pub struct Allocator<'a> {
    constraints: &'a Constraints,
    max_iterations: usize,
}

impl<'a> Allocator<'a> {
    pub fn new(constraints: &'a Constraints) -> Self {
        Self {
            constraints,
            max_iterations: DEFAULT_MAX_ALLOCATION_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Orders tasks by descending priority; ties go to the earlier due date,
    /// undated tasks last, then task id.
    pub fn order_tasks<'t>(&self, tasks: &'t [Task], scorer: &PriorityScorer) -> Vec<(&'t Task, f64)> {
        let mut ordered: Vec<(&Task, f64)> = tasks.iter().map(|task| (task, scorer.score(task))).collect();
        ordered.sort_by(|(a, a_score), (b, b_score)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| match (a.due, b.due) {
                    (Some(a_due), Some(b_due)) => a_due.cmp(&b_due),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        ordered
    }

    /// Never fails: whatever cannot be placed comes back as partial or
    /// unscheduled.
    pub fn allocate(
        &self,
        tasks: &[Task],
        mut candidates: Vec<CandidateBlock>,
        scorer: &PriorityScorer,
    ) -> ScheduleResult {
        candidates.sort_by(|a, b| a.start.cmp(&b.start));
        let mut result = ScheduleResult::default();
        let mut day_minutes: BTreeMap<NaiveDate, i64> = BTreeMap::new();

        for (task, priority) in self.order_tasks(tasks, scorer) {
            if task.estimated_minutes <= 0 {
                result.task_status.insert(task.id.clone(), TaskAllocationStatus::Unscheduled);
                result.unscheduled_tasks.push(UnscheduledTask {
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                    reason: "nothing to schedule: estimate is zero".to_string(),
                });
                result.record(
                    ScheduleLogEntry::new(
                        LogLevel::Warning,
                        CATEGORY,
                        format!("\"{}\" has no estimated time, skipped", task.title),
                    )
                    .with("taskId", &task.id),
                );
                continue;
            }

            let placed = self.place_task(
                task,
                priority,
                &mut candidates,
                &mut day_minutes,
                &mut result,
            );
            self.finish_task(task, placed, &mut result);
        }

        result
    }

    /// Runs one task's placement loop and returns the minutes placed.
    fn place_task(
        &self,
        task: &Task,
        priority: f64,
        candidates: &mut Vec<CandidateBlock>,
        day_minutes: &mut BTreeMap<NaiveDate, i64>,
        result: &mut ScheduleResult,
    ) -> i64 {
        let slot_cap = self.constraints.max_study_minutes_per_block;
        let daily_cap = self.constraints.max_study_minutes_per_day;
        let gap = self.constraints.min_gap_between_blocks_minutes;
        let max_block = task.max_block_minutes.max(task.min_block_minutes).max(1);
        let discard_below = task.min_block_minutes.max(MIN_FEASIBLE_MINUTES);

        let mut remaining = task.estimated_minutes;
        let mut placed = 0;
        let mut iterations = 0;

        while remaining > 0 {
            if iterations >= self.max_iterations {
                result.record(
                    ScheduleLogEntry::new(
                        LogLevel::Debug,
                        CATEGORY,
                        format!("iteration cap reached for \"{}\"", task.title),
                    )
                    .with("taskId", &task.id)
                    .with("iterations", iterations),
                );
                break;
            }
            iterations += 1;

            let needed_budget = task.min_block_minutes.min(remaining).max(1);
            let mut best: Option<(usize, f64)> = None;
            for (idx, candidate) in candidates.iter().enumerate() {
                let duration = candidate.duration_minutes();
                if duration <= 0 || duration < task.min_block_minutes {
                    continue;
                }
                if matches!(slot_cap, Some(cap) if duration > cap) {
                    continue;
                }
                if matches!(task.due, Some(due) if candidate.end > due) {
                    continue;
                }
                let used = day_minutes.get(&candidate.day).copied().unwrap_or(0);
                if daily_cap - used < needed_budget {
                    continue;
                }

                let score = candidate_score(task, priority, candidate);
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((idx, score));
                }
            }

            let Some((idx, _)) = best else {
                break;
            };

            let candidate = &candidates[idx];
            let day = candidate.day;
            let left_today = daily_cap - day_minutes.get(&day).copied().unwrap_or(0);
            let mut duration = max_block
                .min(candidate.duration_minutes())
                .min(remaining)
                .min(left_today);
            if let Some(cap) = slot_cap {
                duration = duration.min(cap);
            }

            let start = candidate.start;
            let Ok(end) = schedule_utils::add_minutes(start, duration) else {
                break;
            };
            result.blocks.push(ScheduledBlock {
                id: schedule_utils::block_id(&task.id, start),
                task_id: task.id.clone(),
                start,
                end,
            });
            remaining -= duration;
            placed += duration;
            *day_minutes.entry(day).or_insert(0) += duration;

            if end >= candidates[idx].end {
                candidates.remove(idx);
            } else {
                candidates[idx].start = end;
                if candidates[idx].duration_minutes() < discard_below {
                    candidates.remove(idx);
                }
            }

            if gap > 0 {
                let Ok(gap_end) = schedule_utils::add_minutes(end, gap) else {
                    candidates.retain(|candidate| candidate.start < end);
                    continue;
                };
                candidates.retain_mut(|candidate| {
                    if candidate.start < end || candidate.start >= gap_end {
                        return true;
                    }
                    if candidate.end <= gap_end {
                        return false;
                    }
                    candidate.start = gap_end;
                    candidate.duration_minutes() >= discard_below
                });
            }
        }

        placed
    }

    fn finish_task(&self, task: &Task, placed: i64, result: &mut ScheduleResult) {
        let remaining = task.estimated_minutes - placed;
        if remaining <= 0 {
            result.task_status.insert(task.id.clone(), TaskAllocationStatus::Complete);
            result.record(
                ScheduleLogEntry::new(
                    LogLevel::Info,
                    CATEGORY,
                    format!("scheduled all {} minutes of \"{}\"", placed, task.title),
                )
                .with("taskId", &task.id),
            );
        } else if placed > 0 {
            result.task_status.insert(
                task.id.clone(),
                TaskAllocationStatus::Partial {
                    scheduled_minutes: placed,
                    remaining_minutes: remaining,
                },
            );
            result.record(
                ScheduleLogEntry::new(
                    LogLevel::Warning,
                    CATEGORY,
                    format!(
                        "partially scheduled \"{}\": {} of {} minutes",
                        task.title, placed, task.estimated_minutes
                    ),
                )
                .with("taskId", &task.id)
                .with("remainingMinutes", remaining),
            );
        } else {
            let reason = match task.due {
                Some(due) => format!(
                    "no free slot of at least {} minutes before {}",
                    task.min_block_minutes,
                    schedule_utils::format_datetime(due)
                ),
                None => format!(
                    "no free slot of at least {} minutes in the horizon",
                    task.min_block_minutes
                ),
            };
            result.task_status.insert(task.id.clone(), TaskAllocationStatus::Unscheduled);
            result.record(
                ScheduleLogEntry::new(
                    LogLevel::Warning,
                    CATEGORY,
                    format!("could not schedule \"{}\": {}", task.title, reason),
                )
                .with("taskId", &task.id),
            );
            result.unscheduled_tasks.push(UnscheduledTask {
                task_id: task.id.clone(),
                title: task.title.clone(),
                reason,
            });
        }
    }
}

/// `α·priority + β·energy − γ·lateness`, where lateness grows as the
/// candidate approaches the task's due date.
pub fn candidate_score(task: &Task, priority: f64, candidate: &CandidateBlock) -> f64 {
    let lateness = match task.due {
        Some(due) => 1.0 / (1.0 + schedule_utils::days_between(candidate.start, due)),
        None => 0.0,
    };
    PRIORITY_WEIGHT * priority + ENERGY_WEIGHT * candidate.energy_score - LATENESS_WEIGHT * lateness
}
