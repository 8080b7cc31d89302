use chrono::{DateTime, FixedOffset};

use crate::models::settings::PriorityWeights;
use crate::models::task::Task;
use crate::services::schedule_utils;

/// Estimated minutes at which the size factor saturates.
const SIZE_SATURATION_MINUTES: f64 = 180.0;

/// Relative priority of tasks within one run. Only the ordering of the scores
/// means anything.
#[derive(Debug, Clone)]
pub struct PriorityScorer<'a> {
    weights: &'a PriorityWeights,
    now: DateTime<FixedOffset>,
    horizon_days: f64,
}

impl<'a> PriorityScorer<'a> {
    pub fn new(weights: &'a PriorityWeights, now: DateTime<FixedOffset>, horizon_days: f64) -> Self {
        Self {
            weights,
            now,
            horizon_days: horizon_days.max(1.0),
        }
    }

    pub fn urgency(&self, task: &Task) -> f64 {
        match task.due {
            Some(due) => {
                let days_until_due = schedule_utils::days_between(self.now, due);
                1.0 - (days_until_due / self.horizon_days).clamp(0.0, 1.0)
            }
            None => 0.0,
        }
    }

    pub fn size_factor(task: &Task) -> f64 {
        (task.estimated_minutes as f64 / SIZE_SATURATION_MINUTES).clamp(0.0, 1.0)
    }

    pub fn score(&self, task: &Task) -> f64 {
        let weights = self.weights;
        weights.urgency * self.urgency(task)
            + weights.importance * task.importance.clamp(0.0, 1.0)
            + weights.difficulty * task.difficulty.clamp(0.0, 1.0)
            + weights.size * Self::size_factor(task)
            + weights.bias_for(task.course_id.as_deref())
    }
}
