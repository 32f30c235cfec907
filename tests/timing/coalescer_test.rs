/*!
 * Timer Coalescer Tests
 * Ordering, coalescing and adaptive rescheduling
 */

use optimizer_kernel::scheduler::{TaskSpec, TimerCoalescer};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

fn names(coalescer: &TimerCoalescer, now: Instant) -> Vec<String> {
    coalescer.tasks_due(now).into_iter().map(|t| t.name).collect()
}

#[test]
fn test_higher_priority_runs_first_on_shared_deadline() {
    let start = Instant::now();
    let mut coalescer = TimerCoalescer::new();
    coalescer
        .register(TaskSpec::new("t1", Duration::from_millis(1000), 5), start)
        .unwrap();
    coalescer
        .register(TaskSpec::new("t2", Duration::from_millis(1000), 9), start)
        .unwrap();

    assert_eq!(names(&coalescer, start + Duration::from_millis(1000)), vec!["t2", "t1"]);
}

#[test]
fn test_nearby_task_pulled_into_wake() {
    let start = Instant::now();
    let mut coalescer = TimerCoalescer::new();
    coalescer
        .register(TaskSpec::new("snapshot", Duration::from_millis(1000), 8), start)
        .unwrap();
    coalescer
        .register(TaskSpec::new("zombies", Duration::from_millis(1050), 5), start)
        .unwrap();

    let now = start + Duration::from_millis(1000);
    let due = coalescer.tasks_due(now);
    assert_eq!(due.len(), 2);
    let overdue: Vec<(&str, bool)> = due.iter().map(|t| (t.name.as_str(), t.overdue)).collect();
    assert!(overdue.contains(&("snapshot", true)));
    assert!(overdue.contains(&("zombies", false)));

    for task in &due {
        coalescer.mark_executed(&task.name, Duration::from_millis(1), now);
    }
    let stats = coalescer.stats();
    assert_eq!(stats.total_executed, 2);
    assert_eq!(stats.total_coalesced, 1);
}

#[test]
fn test_nothing_due_between_deadlines() {
    let start = Instant::now();
    let mut coalescer = TimerCoalescer::new();
    coalescer
        .register(TaskSpec::new("t", Duration::from_millis(1000), 5).fixed(), start)
        .unwrap();

    assert!(coalescer.tasks_due(start + Duration::from_millis(500)).is_empty());
    assert_eq!(
        coalescer.next_wake(start + Duration::from_millis(500)),
        Duration::from_millis(500)
    );
}

#[test]
fn test_fixed_task_keeps_interval() {
    let start = Instant::now();
    let mut coalescer = TimerCoalescer::new();
    coalescer
        .register(TaskSpec::new("t", Duration::from_millis(1000), 5).fixed(), start)
        .unwrap();

    let mut now = start;
    for _ in 0..5 {
        now += Duration::from_millis(1000);
        coalescer.mark_executed("t", Duration::from_micros(10), now);
    }
    assert_eq!(
        coalescer.task("t").unwrap().next_execution(),
        now + Duration::from_millis(1000)
    );
}

#[test]
fn test_cheap_adaptive_task_runs_sooner() {
    let start = Instant::now();
    let mut coalescer = TimerCoalescer::new();
    coalescer
        .register(TaskSpec::new("t", Duration::from_millis(1000), 5), start)
        .unwrap();

    let now = start + Duration::from_millis(1000);
    coalescer.mark_executed("t", Duration::from_micros(10), now);
    assert!(coalescer.task("t").unwrap().next_execution() < now + Duration::from_millis(1000));
}

#[test]
fn test_zero_interval_rejected() {
    let mut coalescer = TimerCoalescer::new();
    assert!(coalescer
        .register(TaskSpec::new("t", Duration::ZERO, 5), Instant::now())
        .is_err());
}
