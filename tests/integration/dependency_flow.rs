use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use cognical_scheduler::{
    AppResult, Constraints, DependencyFilter, InMemoryPlanStore, Plan, PlanEdge, PlanNode, PlanStore,
    ScheduleService, SchedulerSettings, Task,
};

fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2025, 3, day, hour, 0, 0)
        .unwrap()
}

fn constraints() -> Constraints {
    let mut constraints = Constraints::new(at(3, 0), at(5, 23));
    constraints.day_start_hour = 9;
    constraints.day_end_hour = 17;
    constraints
}

fn chain_plan() -> Plan {
    let mut plan = Plan::new("plan-1", "t2", "Lab sequence");
    plan.nodes = vec![
        PlanNode::new("n1", "Pre-lab step", 0).for_assignment("t1"),
        PlanNode::new("n2", "Lab write-up step", 1).for_assignment("t2"),
    ];
    plan.edges = vec![PlanEdge::new("n1", "n2")];
    plan
}

fn setup(plans: Vec<Plan>) -> (Arc<InMemoryPlanStore>, DependencyFilter) {
    let store = Arc::new(InMemoryPlanStore::with_plans(plans).expect("store"));
    let filter = DependencyFilter::new(store.clone(), &SchedulerSettings::default());
    (store, filter)
}

fn lab_tasks() -> Vec<Task> {
    vec![
        Task::new("t1", "Read the pre-lab handout", 60).with_due(at(3, 0) + Duration::days(2)),
        Task::new("t2", "Write the lab report", 90).with_due(at(3, 0) + Duration::days(3)),
    ]
}

#[test]
fn test_blocked_task_gets_no_blocks_and_names_its_prerequisite() {
    let (_store, filter) = setup(vec![chain_plan()]);
    let tasks = lab_tasks();

    let result = filter
        .generate_dependency_aware_schedule(
            &ScheduleService::default(),
            &tasks,
            &[],
            &constraints(),
            at(3, 0),
        )
        .expect("schedule");

    assert_eq!(result.blocks_for_task("t2").count(), 0);
    assert!(result.blocks_for_task("t1").count() > 0);
    assert!(result.is_unscheduled("t2"));
    assert!(result
        .log
        .iter()
        .any(|entry| entry.message.contains("Read the pre-lab handout")));
    assert_eq!(
        result
            .unscheduled_tasks
            .iter()
            .filter(|entry| entry.task_id == "t2")
            .count(),
        1
    );
}

#[test]
fn test_completing_prerequisite_unblocks_dependent_once() {
    let (store, filter) = setup(vec![chain_plan()]);
    let mut tasks = lab_tasks();

    let unblocked = filter
        .complete_task("t1", at(3, 11), &tasks)
        .expect("complete");
    assert_eq!(unblocked, vec!["t2".to_string()]);
    assert!(store.get_plan("t1").unwrap().unwrap().nodes[0].is_completed);

    tasks[0].is_completed = true;
    let result = filter
        .generate_dependency_aware_schedule(
            &ScheduleService::default(),
            &tasks,
            &[],
            &constraints(),
            at(3, 12),
        )
        .expect("schedule");
    assert_eq!(result.scheduled_minutes_for_task("t2"), 90);
    assert_eq!(result.unscheduled_tasks.len(), 1);
    assert_eq!(result.unscheduled_tasks[0].task_id, "t1");
}

#[test]
fn test_two_prerequisites_need_both() {
    let mut plan = Plan::new("plan-2", "exam", "Exam prep");
    plan.nodes = vec![
        PlanNode::new("a", "Chapter 1", 0).for_assignment("ch1"),
        PlanNode::new("b", "Chapter 2", 1).for_assignment("ch2"),
        PlanNode::new("c", "Mock exam", 2).for_assignment("mock"),
    ];
    plan.edges = vec![PlanEdge::new("a", "c"), PlanEdge::new("b", "c")];
    let (_store, filter) = setup(vec![plan]);
    let mut tasks = vec![
        Task::new("ch1", "Chapter 1 notes", 60),
        Task::new("ch2", "Chapter 2 notes", 60),
        Task::new("mock", "Mock exam", 120),
    ];

    assert!(filter
        .complete_task("ch1", at(3, 10), &tasks)
        .expect("complete")
        .is_empty());
    tasks[0].is_completed = true;
    assert_eq!(
        filter.get_blocked_reason("mock", &tasks).expect("reason").as_deref(),
        Some("Waiting on \"Chapter 2 notes\"")
    );

    let unblocked = filter
        .complete_task("ch2", at(3, 11), &tasks)
        .expect("complete");
    assert_eq!(unblocked, vec!["mock".to_string()]);
}

#[test]
fn test_plan_change_is_seen_after_save() {
    let (store, filter) = setup(vec![chain_plan()]);
    let tasks = lab_tasks();
    assert_eq!(filter.get_schedulable_tasks(&tasks).unwrap().schedulable.len(), 1);

    let mut plan = store.get_plan("t2").unwrap().unwrap();
    plan.edges.clear();
    store.save_plan(plan).unwrap();

    let split = filter.get_schedulable_tasks(&tasks).unwrap();
    assert_eq!(split.schedulable.len(), 2);
    assert!(split.excluded.is_empty());
}

#[test]
fn test_stale_schedule_is_reconciled() {
    let (_store, filter) = setup(vec![chain_plan()]);
    let tasks = lab_tasks();

    let result = ScheduleService::default()
        .generate_schedule(&tasks, &[], &constraints(), at(3, 0))
        .expect("schedule");
    assert!(result.blocks_for_task("t2").count() > 0);

    let cleaned = filter.remove_invalid_blocks(result, &tasks).expect("reconcile");
    assert_eq!(cleaned.blocks_for_task("t2").count(), 0);
    assert!(cleaned.is_unscheduled("t2"));
    assert!(cleaned.blocks_for_task("t1").count() > 0);
}

/// Serves one plan for every lookup without validating it, as a store backed
/// by stale data would.
struct FixedPlanStore(Plan);

impl PlanStore for FixedPlanStore {
    fn get_plan(&self, task_id: &str) -> AppResult<Option<Plan>> {
        Ok(self.0.assignment_ids().iter().any(|id| id == task_id).then(|| self.0.clone()))
    }

    fn save_plan(&self, _plan: Plan) -> AppResult<()> {
        Ok(())
    }

    fn delete_plan(&self, _task_id: &str) -> AppResult<()> {
        Ok(())
    }
}

#[test]
fn test_invalid_stored_plan_holds_back_only_its_tasks() {
    let mut broken = Plan::new("plan-broken", "x", "Broken plan");
    broken.nodes = vec![PlanNode::new("a", "Step a", 0).for_assignment("x")];
    broken.edges = vec![PlanEdge::new("a", "ghost")];
    let filter = DependencyFilter::new(
        Arc::new(FixedPlanStore(broken)),
        &SchedulerSettings::default(),
    );
    let tasks = vec![
        Task::new("x", "Task on the broken plan", 60),
        Task::new("y", "Unplanned reading", 60),
    ];

    let result = filter
        .generate_dependency_aware_schedule(
            &ScheduleService::default(),
            &tasks,
            &[],
            &constraints(),
            at(3, 0),
        )
        .expect("invalid plan must not abort the run");

    assert!(result.blocks_for_task("y").count() > 0);
    assert_eq!(result.blocks_for_task("x").count(), 0);
    let entry = result
        .unscheduled_tasks
        .iter()
        .find(|entry| entry.task_id == "x")
        .expect("x listed as unscheduled");
    assert!(entry.reason.starts_with("plan invalid"), "{}", entry.reason);
    assert_eq!(
        filter.get_blocked_reason("x", &tasks).expect("reason"),
        Some(entry.reason.clone())
    );
    assert!(filter
        .get_newly_unblocked_tasks("y", &tasks)
        .expect("unblocked")
        .is_empty());
}
