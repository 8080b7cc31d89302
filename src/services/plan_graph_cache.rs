use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::plan::Plan;
use crate::models::settings::DEFAULT_GRAPH_CACHE_CAPACITY;
use crate::services::plan_graph::PlanGraph;

struct CachedGraph {
    revision: u64,
    graph: Arc<PlanGraph>,
}

/// Built graphs keyed by plan id. An entry is only served while the plan's
/// revision matches the one it was built from.
pub struct PlanGraphCache {
    entries: Mutex<LruCache<String, CachedGraph>>,
}

impl PlanGraphCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_GRAPH_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get_or_build(&self, plan: &Plan) -> AppResult<Arc<PlanGraph>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::other("plan graph cache lock poisoned"))?;

        if let Some(cached) = entries.get(&plan.id) {
            if cached.revision == plan.revision {
                return Ok(Arc::clone(&cached.graph));
            }
        }

        let graph = Arc::new(PlanGraph::from_plan(plan)?);
        debug!(
            target: "app::plan_graph",
            plan_id = %plan.id,
            revision = plan.revision,
            "plan graph cache miss"
        );
        entries.put(
            plan.id.clone(),
            CachedGraph {
                revision: plan.revision,
                graph: Arc::clone(&graph),
            },
        );
        Ok(graph)
    }

    pub fn invalidate(&self, plan_id: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(plan_id);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PlanGraphCache {
    fn default() -> Self {
        Self::new(DEFAULT_GRAPH_CACHE_CAPACITY)
    }
}
