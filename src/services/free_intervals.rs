use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use tracing::debug;

use crate::models::schedule::{Constraints, FreeInterval, MIN_FEASIBLE_MINUTES};
use crate::models::task::FixedEvent;
use crate::services::schedule_utils;

pub type FreeIntervalMap = BTreeMap<NaiveDate, Vec<FreeInterval>>;

/// Free study time per day of the horizon, after locked events and blackout
/// windows are cut out. Fragments shorter than [`MIN_FEASIBLE_MINUTES`] are
/// dropped.
pub fn compute_free_intervals(constraints: &Constraints, events: &[FixedEvent]) -> FreeIntervalMap {
    let offset = constraints.offset();
    let first_day = constraints.horizon_start.date_naive();
    let horizon_end = constraints.horizon_end.with_timezone(&offset);
    let last_day = horizon_end.date_naive();

    // Spans are moved into the horizon's offset so every interval, candidate
    // and block reads its hour and day there.
    let mut blocking_spans: Vec<(DateTime<FixedOffset>, DateTime<FixedOffset>)> = events
        .iter()
        .filter_map(FixedEvent::blocking_span)
        .chain(
            constraints
                .blackout_windows
                .iter()
                .filter(|window| window.end > window.start)
                .map(|window| (window.start, window.end)),
        )
        .map(|(start, end)| (start.with_timezone(&offset), end.with_timezone(&offset)))
        .collect();

    let mut result = FreeIntervalMap::new();
    let mut day = first_day;
    while day <= last_day {
        let day_start = schedule_utils::at_hour(day, constraints.day_start_hour, offset)
            .max(constraints.horizon_start);
        let day_end = schedule_utils::at_hour(day, constraints.day_end_hour, offset)
            .min(horizon_end);

        if day_end > day_start {
            let mut blockers: Vec<(DateTime<FixedOffset>, DateTime<FixedOffset>)> = blocking_spans
                .iter()
                .copied()
                .filter(|(start, end)| schedule_utils::overlaps(*start, *end, day_start, day_end))
                .collect();
            blockers.sort();

            let mut free = vec![FreeInterval {
                start: day_start,
                end: day_end,
            }];
            for (start, end) in blockers {
                free = subtract(&free, start, end);
            }
            free.retain(|interval| interval.duration_minutes() >= MIN_FEASIBLE_MINUTES);

            debug!(
                target: "app::scheduler",
                %day,
                intervals = free.len(),
                free_minutes = free.iter().map(FreeInterval::duration_minutes).sum::<i64>(),
                "computed free intervals"
            );
            if !free.is_empty() {
                result.insert(day, free);
            }
        }

        day = match day.checked_add_signed(Duration::days(1)) {
            Some(next) => next,
            None => break,
        };
    }

    result
}

/// Removes `[start, end)` from every interval, splitting where it lands inside.
pub fn subtract(
    intervals: &[FreeInterval],
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
) -> Vec<FreeInterval> {
    let mut remaining = Vec::with_capacity(intervals.len() + 1);
    for interval in intervals {
        if end <= interval.start || start >= interval.end {
            remaining.push(*interval);
        } else if start <= interval.start && end >= interval.end {
            // fully covered
        } else if start <= interval.start {
            remaining.push(FreeInterval {
                start: end,
                end: interval.end,
            });
        } else if end >= interval.end {
            remaining.push(FreeInterval {
                start: interval.start,
                end: start,
            });
        } else {
            remaining.push(FreeInterval {
                start: interval.start,
                end: start,
            });
            remaining.push(FreeInterval {
                start: end,
                end: interval.end,
            });
        }
    }
    remaining
}
