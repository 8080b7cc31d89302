use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Hard stop for a single task's allocation loop.
pub const DEFAULT_MAX_ALLOCATION_ITERATIONS: usize = 5000;

pub const DEFAULT_GRAPH_CACHE_CAPACITY: usize = 64;

/// Weights of the task priority formula.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PriorityWeights {
    pub urgency: f64,
    pub importance: f64,
    pub difficulty: f64,
    pub size: f64,
    /// Extra priority per course id.
    pub course_bias: BTreeMap<String, f64>,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            urgency: 0.5,
            importance: 0.3,
            difficulty: 0.1,
            size: 0.1,
            course_bias: BTreeMap::new(),
        }
    }
}

impl PriorityWeights {
    pub fn bias_for(&self, course_id: Option<&str>) -> f64 {
        course_id
            .and_then(|id| self.course_bias.get(id))
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerSettings {
    pub enforce_dependencies: bool,
    pub priority_weights: PriorityWeights,
    pub max_allocation_iterations: usize,
    pub graph_cache_capacity: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enforce_dependencies: true,
            priority_weights: PriorityWeights::default(),
            max_allocation_iterations: DEFAULT_MAX_ALLOCATION_ITERATIONS,
            graph_cache_capacity: DEFAULT_GRAPH_CACHE_CAPACITY,
        }
    }
}

impl SchedulerSettings {
    /// Loads settings from a `.yaml`/`.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let settings = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&raw)?,
            Some("json") => Self::from_json_str(&raw)?,
            other => {
                return Err(AppError::validation(format!(
                    "unsupported settings format: {}",
                    other.unwrap_or("<none>")
                )))
            }
        };
        debug!(target: "app::settings", path = %path.display(), "loaded scheduler settings");
        Ok(settings)
    }

    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        let settings: Self = serde_yaml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_str(raw: &str) -> AppResult<Self> {
        let settings: Self = serde_json::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.max_allocation_iterations == 0 {
            return Err(AppError::validation(
                "maxAllocationIterations must be at least 1",
            ));
        }
        if self.graph_cache_capacity == 0 {
            return Err(AppError::validation("graphCacheCapacity must be at least 1"));
        }
        let weights = &self.priority_weights;
        for (name, value) in [
            ("urgency", weights.urgency),
            ("importance", weights.importance),
            ("difficulty", weights.difficulty),
            ("size", weights.size),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::validation(format!(
                    "priority weight {name} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }
}
