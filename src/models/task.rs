use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A unit of study work with an estimated duration.
///
/// Read-only for the length of a scheduling run; only `is_completed` is
/// changed, and only by callers outside the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub estimated_minutes: i64,
    #[serde(default = "default_min_block_minutes")]
    pub min_block_minutes: i64,
    #[serde(default = "default_max_block_minutes")]
    pub max_block_minutes: i64,
    #[serde(default)]
    pub due: Option<DateTime<FixedOffset>>,
    #[serde(default = "default_unit_score")]
    pub difficulty: f64,
    #[serde(default = "default_unit_score")]
    pub importance: f64,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, estimated_minutes: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            estimated_minutes,
            min_block_minutes: default_min_block_minutes(),
            max_block_minutes: default_max_block_minutes(),
            due: None,
            difficulty: default_unit_score(),
            importance: default_unit_score(),
            course_id: None,
            is_completed: false,
        }
    }

    pub fn with_blocks(mut self, min_block_minutes: i64, max_block_minutes: i64) -> Self {
        self.min_block_minutes = min_block_minutes;
        self.max_block_minutes = max_block_minutes;
        self
    }

    pub fn with_due(mut self, due: DateTime<FixedOffset>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_scores(mut self, difficulty: f64, importance: f64) -> Self {
        self.difficulty = difficulty;
        self.importance = importance;
        self
    }

    pub fn with_course(mut self, course_id: impl Into<String>) -> Self {
        self.course_id = Some(course_id.into());
        self
    }

    pub fn completed(mut self) -> Self {
        self.is_completed = true;
        self
    }
}

fn default_min_block_minutes() -> i64 {
    30
}

fn default_max_block_minutes() -> i64 {
    90
}

fn default_unit_score() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    #[default]
    Calendar,
    Manual,
    Imported,
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSource::Calendar => write!(f, "calendar"),
            EventSource::Manual => write!(f, "manual"),
            EventSource::Imported => write!(f, "imported"),
        }
    }
}

/// An already-resolved calendar commitment.
///
/// Only locked events with an end time take time away from scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FixedEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<FixedOffset>,
    #[serde(default)]
    pub end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub source: EventSource,
}

impl FixedEvent {
    pub fn locked(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start,
            end: Some(end),
            is_locked: true,
            source: EventSource::Calendar,
        }
    }

    /// The span this event blocks, if it blocks anything at all.
    pub fn blocking_span(&self) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        if !self.is_locked {
            return None;
        }
        match self.end {
            Some(end) if end > self.start => Some((self.start, end)),
            _ => None,
        }
    }
}
