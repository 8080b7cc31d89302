use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use cognical_scheduler::models::schedule::FreeInterval;
use cognical_scheduler::services::candidate_generator::generate_candidates;
use cognical_scheduler::services::free_intervals::compute_free_intervals;
use cognical_scheduler::{
    Constraints, EnergyProfile, FixedEvent, ScheduleResult, ScheduleService, SchedulerSettings,
    TaskAllocationStatus, Task,
};
use proptest::prelude::*;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2025, 3, day, hour, minute, 0)
        .unwrap()
}

fn study_day() -> Constraints {
    let mut constraints = Constraints::new(at(3, 0, 0), at(3, 23, 0));
    constraints.day_start_hour = 9;
    constraints.day_end_hour = 17;
    constraints.max_study_minutes_per_day = 240;
    constraints
}

fn assert_complete(result: &ScheduleResult, tasks: &[Task]) {
    for task in tasks {
        let has_blocks = result.blocks_for_task(&task.id).next().is_some();
        let listed = result
            .unscheduled_tasks
            .iter()
            .filter(|entry| entry.task_id == task.id)
            .count();
        assert!(
            (has_blocks && listed == 0) || (!has_blocks && listed == 1),
            "task {} appears {} times in unscheduled with blocks={}",
            task.id,
            listed,
            has_blocks
        );
    }
}

#[test]
fn test_long_task_is_split_into_two_blocks() {
    let now = at(3, 0, 0);
    let task = Task::new("t1", "Problem set", 120)
        .with_blocks(30, 90)
        .with_due(now + Duration::days(3));

    let result = ScheduleService::default()
        .generate_schedule(&[task], &[], &study_day(), now)
        .expect("schedule");

    assert_eq!(result.blocks.len(), 2);
    assert_eq!(result.scheduled_minutes_for_task("t1"), 120);
    for block in &result.blocks {
        assert!(block.duration_minutes() <= 90);
        assert!(block.start >= at(3, 9, 0) && block.end <= at(3, 17, 0));
    }
    assert_eq!(result.task_status["t1"], TaskAllocationStatus::Complete);
    assert!(result.unscheduled_tasks.is_empty());
}

#[test]
fn test_locked_event_pushes_long_block_to_afternoon() {
    let events = vec![FixedEvent::locked("lecture", "Lecture", at(3, 10, 0), at(3, 11, 0))];

    let free = compute_free_intervals(&study_day(), &events);
    let intervals: Vec<FreeInterval> = free.values().flatten().copied().collect();
    assert_eq!(
        intervals,
        vec![
            FreeInterval { start: at(3, 9, 0), end: at(3, 10, 0) },
            FreeInterval { start: at(3, 11, 0), end: at(3, 17, 0) },
        ]
    );

    let task = Task::new("t1", "Lab report", 90).with_blocks(90, 120);
    let result = ScheduleService::default()
        .generate_schedule(&[task], &events, &study_day(), at(3, 0, 0))
        .expect("schedule");

    assert_eq!(result.blocks.len(), 1);
    assert!(result.blocks[0].start >= at(3, 11, 0));
    assert_eq!(result.blocks[0].duration_minutes(), 90);
}

#[test]
fn test_event_in_other_offset_keeps_energy_hours_local() {
    let plus_five = FixedOffset::east_opt(5 * 3600).unwrap();
    let mut constraints = study_day();
    constraints.energy_profile = EnergyProfile::new().with_hour(11, 1.0).with_hour(16, 0.0);
    let events = vec![FixedEvent::locked(
        "call",
        "Call with tutor abroad",
        at(3, 9, 0).with_timezone(&plus_five),
        at(3, 11, 0).with_timezone(&plus_five),
    )];

    let free = compute_free_intervals(&constraints, &events);
    let candidates = generate_candidates(&free, Some(60), &constraints.energy_profile);
    assert_eq!(candidates[0].start, at(3, 11, 0));
    assert_eq!(candidates[0].start.offset(), at(3, 11, 0).offset());
    assert_eq!(candidates[0].energy_score, 1.0);

    let task = Task::new("t1", "Essay outline", 60).with_blocks(60, 60);
    let result = ScheduleService::default()
        .generate_schedule(&[task], &events, &constraints, at(3, 0, 0))
        .expect("schedule");
    assert_eq!(result.blocks[0].start, at(3, 11, 0));
    assert_eq!(result.blocks[0].start.offset(), at(3, 11, 0).offset());
}

#[test]
fn test_schedule_is_deterministic() {
    let mut constraints = Constraints::new(at(3, 0, 0), at(6, 23, 0));
    constraints.day_start_hour = 8;
    constraints.day_end_hour = 20;
    constraints.max_study_minutes_per_block = Some(60);
    constraints.min_gap_between_blocks_minutes = 10;
    let events = vec![
        FixedEvent::locked("e1", "Seminar", at(3, 12, 0), at(3, 14, 0)),
        FixedEvent::locked("e2", "Work shift", at(5, 8, 0), at(5, 13, 0)),
    ];
    let tasks = vec![
        Task::new("a", "Essay", 240).with_due(at(6, 12, 0)).with_course("hist"),
        Task::new("b", "Problem set", 150).with_scores(0.9, 0.8),
        Task::new("c", "Reading", 90).with_blocks(45, 45),
        Task::new("d", "Flashcards", 40).with_blocks(20, 20),
    ];
    let service = ScheduleService::default();

    let first = service
        .generate_schedule(&tasks, &events, &constraints, at(3, 0, 0))
        .expect("schedule");
    for _ in 0..3 {
        let again = service
            .generate_schedule(&tasks, &events, &constraints, at(3, 0, 0))
            .expect("schedule");
        assert_eq!(first, again);
    }
    assert_complete(&first, &tasks);
}

#[test]
fn test_overbooked_week_respects_daily_budget() {
    let mut constraints = Constraints::new(at(3, 0, 0), at(5, 23, 0));
    constraints.day_start_hour = 9;
    constraints.day_end_hour = 21;
    constraints.max_study_minutes_per_day = 150;
    let tasks: Vec<Task> = (0..6)
        .map(|i| Task::new(format!("t{i}"), format!("Task {i}"), 120).with_blocks(30, 60))
        .collect();

    let result = ScheduleService::default()
        .generate_schedule(&tasks, &[], &constraints, at(3, 0, 0))
        .expect("schedule");

    for (day, minutes) in result.minutes_per_day() {
        assert!(minutes <= 150, "{day} has {minutes} minutes");
    }
    assert_eq!(result.blocks.iter().map(|b| b.duration_minutes()).sum::<i64>(), 450);
    assert_complete(&result, &tasks);
}

#[test]
fn test_iteration_cap_from_settings() {
    let settings = SchedulerSettings {
        max_allocation_iterations: 1,
        ..SchedulerSettings::default()
    };
    let task = Task::new("t1", "Reading", 90).with_blocks(30, 30);
    let result = ScheduleService::new(settings)
        .generate_schedule(&[task], &[], &study_day(), at(3, 0, 0))
        .expect("schedule");

    assert_eq!(result.scheduled_minutes_for_task("t1"), 30);
    assert!(matches!(
        result.task_status["t1"],
        TaskAllocationStatus::Partial { remaining_minutes: 60, .. }
    ));
    assert!(result.log.iter().any(|entry| entry.message.contains("iteration cap")));
}

#[test]
fn test_result_serializes_camel_case() {
    let task = Task::new("t1", "Reading", 60);
    let result = ScheduleService::default()
        .generate_schedule(&[task], &[], &study_day(), at(3, 0, 0))
        .expect("schedule");
    let json = serde_json::to_value(&result).expect("json");

    assert!(json.get("unscheduledTasks").is_some());
    assert_eq!(json["blocks"][0]["taskId"], "t1");
    assert_eq!(json["taskStatus"]["t1"]["status"], "complete");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_budget_and_completeness_hold(
        daily_cap in 30i64..=300,
        gap in 0i64..=30,
        specs in prop::collection::vec((0i64..=300, 20i64..=60, 0i64..=60), 1..8),
    ) {
        let mut constraints = Constraints::new(at(3, 0, 0), at(5, 23, 0));
        constraints.day_start_hour = 8;
        constraints.day_end_hour = 18;
        constraints.max_study_minutes_per_day = daily_cap;
        constraints.min_gap_between_blocks_minutes = gap;
        let events = vec![FixedEvent::locked("e1", "Class", at(4, 10, 0), at(4, 12, 0))];
        let tasks: Vec<Task> = specs
            .iter()
            .enumerate()
            .map(|(i, (estimate, min_block, extra))| {
                Task::new(format!("t{i}"), format!("Task {i}"), *estimate)
                    .with_blocks(*min_block, min_block + extra)
            })
            .collect();

        let result = ScheduleService::default()
            .generate_schedule(&tasks, &events, &constraints, at(3, 0, 0))
            .expect("schedule");

        for minutes in result.minutes_per_day().values() {
            prop_assert!(*minutes <= daily_cap);
        }
        for block in &result.blocks {
            prop_assert!(block.end <= at(4, 10, 0) || block.start >= at(4, 12, 0));
        }
        assert_complete(&result, &tasks);
    }
}
