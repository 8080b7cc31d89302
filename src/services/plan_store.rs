use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::plan::Plan;
use crate::services::plan_graph::PlanGraph;

/// Where plans live between scheduling runs.
///
/// Lookups are by task id: a plan answers for its own assignment and for every
/// task bound to one of its nodes.
pub trait PlanStore: Send + Sync {
    fn get_plan(&self, task_id: &str) -> AppResult<Option<Plan>>;
    fn save_plan(&self, plan: Plan) -> AppResult<()>;
    fn delete_plan(&self, task_id: &str) -> AppResult<()>;
}

#[derive(Default)]
struct StoreState {
    plans: HashMap<String, Plan>,
    plan_by_task: HashMap<String, String>,
}

impl StoreState {
    fn unindex(&mut self, plan_id: &str) {
        self.plan_by_task.retain(|_, indexed| indexed != plan_id);
    }
}

/// Process-local [`PlanStore`]. Plans that fail graph validation are refused;
/// every accepted save bumps the stored plan's revision.
#[derive(Default)]
pub struct InMemoryPlanStore {
    state: RwLock<StoreState>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: impl IntoIterator<Item = Plan>) -> AppResult<Self> {
        let store = Self::new();
        for plan in plans {
            store.save_plan(plan)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|state| state.plans.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PlanStore for InMemoryPlanStore {
    fn get_plan(&self, task_id: &str) -> AppResult<Option<Plan>> {
        let state = self
            .state
            .read()
            .map_err(|_| AppError::store("plan store lock poisoned"))?;
        Ok(state
            .plan_by_task
            .get(task_id)
            .and_then(|plan_id| state.plans.get(plan_id))
            .cloned())
    }

    fn save_plan(&self, mut plan: Plan) -> AppResult<()> {
        PlanGraph::from_plan(&plan)?;

        let mut state = self
            .state
            .write()
            .map_err(|_| AppError::store("plan store lock poisoned"))?;

        let previous = state.plans.get(&plan.id).map_or(0, |stored| stored.revision);
        plan.revision = previous.max(plan.revision) + 1;

        state.unindex(&plan.id);
        for task_id in plan.assignment_ids() {
            state.plan_by_task.insert(task_id, plan.id.clone());
        }
        debug!(
            target: "app::plan_store",
            plan_id = %plan.id,
            revision = plan.revision,
            "plan saved"
        );
        state.plans.insert(plan.id.clone(), plan);
        Ok(())
    }

    fn delete_plan(&self, task_id: &str) -> AppResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| AppError::store("plan store lock poisoned"))?;

        let plan_id = state
            .plan_by_task
            .get(task_id)
            .cloned()
            .ok_or_else(AppError::not_found)?;
        state.unindex(&plan_id);
        state.plans.remove(&plan_id);
        debug!(target: "app::plan_store", %plan_id, "plan deleted");
        Ok(())
    }
}
