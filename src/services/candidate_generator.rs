use crate::models::schedule::{CandidateBlock, EnergyProfile, MIN_FEASIBLE_MINUTES};
use crate::services::free_intervals::FreeIntervalMap;
use crate::services::schedule_utils;

/// Cuts free intervals into candidate blocks no longer than `max_block_minutes`
/// and returns them sorted by start. A trailing piece shorter than
/// [`MIN_FEASIBLE_MINUTES`] is dropped.
pub fn generate_candidates(
    free: &FreeIntervalMap,
    max_block_minutes: Option<i64>,
    energy: &EnergyProfile,
) -> Vec<CandidateBlock> {
    let mut candidates = Vec::new();

    for (day, intervals) in free {
        for interval in intervals {
            let total = interval.duration_minutes();
            if total < MIN_FEASIBLE_MINUTES {
                continue;
            }

            let fits_whole = max_block_minutes.map_or(true, |cap| total <= cap);
            if fits_whole {
                candidates.push(CandidateBlock {
                    start: interval.start,
                    end: interval.end,
                    energy_score: energy.score_for_hour(schedule_utils::hour_of(interval.start)),
                    day: *day,
                });
                continue;
            }

            let cap = max_block_minutes.unwrap_or(total);
            let mut cursor = interval.start;
            loop {
                let remaining = schedule_utils::duration_minutes(cursor, interval.end);
                let chunk = cap.min(remaining);
                if chunk < MIN_FEASIBLE_MINUTES {
                    break;
                }
                let Ok(end) = schedule_utils::add_minutes(cursor, chunk) else {
                    break;
                };
                candidates.push(CandidateBlock {
                    start: cursor,
                    end,
                    energy_score: energy.score_for_hour(schedule_utils::hour_of(cursor)),
                    day: *day,
                });
                cursor = end;
            }
        }
    }

    candidates.sort_by(|a, b| a.start.cmp(&b.start));
    candidates
}
