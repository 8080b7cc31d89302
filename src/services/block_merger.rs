use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::models::schedule::{Constraints, ScheduledBlock};
use crate::models::task::Task;
use crate::services::free_intervals::FreeIntervalMap;
use crate::services::schedule_utils;

/// Coalesces back-to-back blocks of the same task in one pass over the blocks
/// sorted by start.
///
/// Two blocks merge when the gap between them is at most the configured
/// minimum gap and the merged block still fits the per-slot cap, the task's
/// own maximum block, a single free interval, and the day's study budget
/// (bridged gap minutes count as scheduled).
pub fn merge_blocks(
    mut blocks: Vec<ScheduledBlock>,
    tasks: &[Task],
    free: &FreeIntervalMap,
    constraints: &Constraints,
) -> Vec<ScheduledBlock> {
    blocks.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.task_id.cmp(&b.task_id)));

    let max_block_by_task: HashMap<&str, i64> = tasks
        .iter()
        .map(|task| (task.id.as_str(), task.max_block_minutes))
        .collect();
    let mut day_totals: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for block in &blocks {
        *day_totals.entry(block.start.date_naive()).or_insert(0) += block.duration_minutes();
    }

    let mut merged: Vec<ScheduledBlock> = Vec::with_capacity(blocks.len());
    let mut iter = blocks.into_iter();
    let Some(mut current) = iter.next() else {
        return merged;
    };

    for next in iter {
        let gap = (next.start - current.end).num_minutes();
        let day = current.start.date_naive();
        let can_merge = next.task_id == current.task_id
            && gap >= 0
            && gap <= constraints.min_gap_between_blocks_minutes
            && schedule_utils::same_day(current.start, next.end)
            && fits_caps(&current, &next, constraints, &max_block_by_task)
            && inside_one_interval(free, day, &current, &next)
            && day_totals.get(&day).copied().unwrap_or(0) + gap
                <= constraints.max_study_minutes_per_day;

        if can_merge {
            *day_totals.entry(day).or_insert(0) += gap;
            current.end = next.end;
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    merged
}

fn fits_caps(
    current: &ScheduledBlock,
    next: &ScheduledBlock,
    constraints: &Constraints,
    max_block_by_task: &HashMap<&str, i64>,
) -> bool {
    let merged_minutes = (next.end - current.start).num_minutes();
    if matches!(constraints.max_study_minutes_per_block, Some(cap) if merged_minutes > cap) {
        return false;
    }
    match max_block_by_task.get(current.task_id.as_str()) {
        Some(max) => merged_minutes <= *max,
        None => true,
    }
}

fn inside_one_interval(
    free: &FreeIntervalMap,
    day: NaiveDate,
    current: &ScheduledBlock,
    next: &ScheduledBlock,
) -> bool {
    free.get(&day).map_or(false, |intervals| {
        intervals
            .iter()
            .any(|interval| interval.contains(current.start, next.end))
    })
}
