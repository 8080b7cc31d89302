//! Study-time scheduling: plan prerequisite graphs, free-time computation and
//! greedy block allocation.

pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{AppError, AppResult, PlanGraphError};
pub use models::plan::{NodeType, Plan, PlanEdge, PlanGraphStatistics, PlanNode};
pub use models::schedule::{
    Constraints, EnergyProfile, ScheduleLogEntry, ScheduleResult, ScheduledBlock,
    TaskAllocationStatus, TimeWindow, UnscheduledTask,
};
pub use models::settings::{PriorityWeights, SchedulerSettings};
pub use models::task::{EventSource, FixedEvent, Task};
pub use services::dependency_filter::{DependencyFilter, SchedulableTasks};
pub use services::plan_graph::PlanGraph;
pub use services::plan_store::{InMemoryPlanStore, PlanStore};
pub use services::schedule_service::ScheduleService;
