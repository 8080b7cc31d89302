use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Shortest span (in minutes) worth scheduling at all.
pub const MIN_FEASIBLE_MINUTES: i64 = 20;

/// Energy score used for hours missing from an [`EnergyProfile`].
pub const DEFAULT_ENERGY_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl TimeWindow {
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        Self { start, end }
    }
}

/// Hour-of-day productivity map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct EnergyProfile(BTreeMap<u32, f64>);

impl EnergyProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hour(mut self, hour: u32, score: f64) -> Self {
        self.set(hour, score);
        self
    }

    pub fn set(&mut self, hour: u32, score: f64) {
        self.0.insert(hour % 24, score.clamp(0.0, 1.0));
    }

    pub fn score_for_hour(&self, hour: u32) -> f64 {
        self.0.get(&hour).copied().unwrap_or(DEFAULT_ENERGY_SCORE)
    }
}

/// Configuration for a single scheduling run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Constraints {
    pub horizon_start: DateTime<FixedOffset>,
    pub horizon_end: DateTime<FixedOffset>,
    #[serde(default = "default_day_start_hour")]
    pub day_start_hour: u32,
    #[serde(default = "default_day_end_hour")]
    pub day_end_hour: u32,
    #[serde(default = "default_max_study_minutes_per_day")]
    pub max_study_minutes_per_day: i64,
    #[serde(default)]
    pub max_study_minutes_per_block: Option<i64>,
    #[serde(default)]
    pub min_gap_between_blocks_minutes: i64,
    #[serde(default)]
    pub blackout_windows: Vec<TimeWindow>,
    #[serde(default)]
    pub energy_profile: EnergyProfile,
}

impl Constraints {
    pub fn new(horizon_start: DateTime<FixedOffset>, horizon_end: DateTime<FixedOffset>) -> Self {
        Self {
            horizon_start,
            horizon_end,
            day_start_hour: default_day_start_hour(),
            day_end_hour: default_day_end_hour(),
            max_study_minutes_per_day: default_max_study_minutes_per_day(),
            max_study_minutes_per_block: None,
            min_gap_between_blocks_minutes: 0,
            blackout_windows: Vec::new(),
            energy_profile: EnergyProfile::default(),
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.horizon_end < self.horizon_start {
            return Err(AppError::validation(
                "horizon end must not be earlier than horizon start",
            ));
        }
        if self.day_end_hour > 24 || self.day_start_hour >= self.day_end_hour {
            return Err(AppError::validation(format!(
                "invalid study day {}:00-{}:00",
                self.day_start_hour, self.day_end_hour
            )));
        }
        if self.max_study_minutes_per_day < 0 || self.min_gap_between_blocks_minutes < 0 {
            return Err(AppError::validation("budgets and gaps must be non-negative"));
        }
        if matches!(self.max_study_minutes_per_block, Some(cap) if cap <= 0) {
            return Err(AppError::validation("per-block cap must be positive"));
        }
        Ok(())
    }

    /// Whole days spanned by the horizon, never less than one.
    pub fn horizon_days(&self) -> f64 {
        let minutes = (self.horizon_end - self.horizon_start).num_minutes() as f64;
        (minutes / (24.0 * 60.0)).max(1.0)
    }

    pub fn offset(&self) -> FixedOffset {
        *self.horizon_start.offset()
    }
}

fn default_day_start_hour() -> u32 {
    8
}

fn default_day_end_hour() -> u32 {
    22
}

fn default_max_study_minutes_per_day() -> i64 {
    240
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FreeInterval {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl FreeInterval {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn contains(&self, start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> bool {
        self.start <= start && end <= self.end
    }
}

/// A schedulable slice of free time, trimmed in place while allocating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateBlock {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub energy_score: f64,
    pub day: NaiveDate,
}

impl CandidateBlock {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledBlock {
    pub id: String,
    pub task_id: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl ScheduledBlock {
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnscheduledTask {
    pub task_id: String,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TaskAllocationStatus {
    Complete,
    Partial {
        scheduled_minutes: i64,
        remaining_minutes: i64,
    },
    Unscheduled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
}

/// One structured line of the run log handed back with a [`ScheduleResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleLogEntry {
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ScheduleLogEntry {
    pub fn new(level: LogLevel, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            category: category.into(),
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// Mirrors the entry to `tracing`.
    pub fn emit(&self) {
        let category = self.category.as_str();
        let metadata = format!("{:?}", self.metadata);
        match self.level {
            LogLevel::Debug => {
                debug!(target: "app::scheduler", %category, %metadata, "{}", self.message)
            }
            LogLevel::Info => {
                info!(target: "app::scheduler", %category, %metadata, "{}", self.message)
            }
            LogLevel::Warning => {
                warn!(target: "app::scheduler", %category, %metadata, "{}", self.message)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResult {
    pub blocks: Vec<ScheduledBlock>,
    pub unscheduled_tasks: Vec<UnscheduledTask>,
    #[serde(default)]
    pub task_status: BTreeMap<String, TaskAllocationStatus>,
    pub log: Vec<ScheduleLogEntry>,
}

impl ScheduleResult {
    /// Appends an entry to the run log and mirrors it to `tracing`.
    pub fn record(&mut self, entry: ScheduleLogEntry) {
        entry.emit();
        self.log.push(entry);
    }

    pub fn blocks_for_task<'a>(
        &'a self,
        task_id: &'a str,
    ) -> impl Iterator<Item = &'a ScheduledBlock> + 'a {
        self.blocks.iter().filter(move |block| block.task_id == task_id)
    }

    pub fn scheduled_minutes_for_task(&self, task_id: &str) -> i64 {
        self.blocks_for_task(task_id)
            .map(ScheduledBlock::duration_minutes)
            .sum()
    }

    /// Scheduled minutes per calendar day of each block's start.
    pub fn minutes_per_day(&self) -> BTreeMap<NaiveDate, i64> {
        let mut totals = BTreeMap::new();
        for block in &self.blocks {
            *totals.entry(block.start.date_naive()).or_insert(0) += block.duration_minutes();
        }
        totals
    }

    pub fn is_unscheduled(&self, task_id: &str) -> bool {
        self.unscheduled_tasks
            .iter()
            .any(|entry| entry.task_id == task_id)
    }
}
