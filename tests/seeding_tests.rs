use std::collections::HashSet;
use std::sync::Arc;

use chorely::storage::{TaskFilter, TaskStore};
use chorely::{
    ChoreService, EngineConfig, FixedClock, InMemoryStore, Member, Recurrence, Task, TaskId,
    TaskStatus,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, min, 0).unwrap()
}

struct Harness {
    store: Arc<InMemoryStore>,
    service: ChoreService,
    members: Vec<Member>,
}

fn harness(now: NaiveDateTime) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let members = ["Alice", "Bob", "Charlie"]
        .iter()
        .map(|n| store.add_member(Member::new(*n)).unwrap())
        .collect();
    let clock = Arc::new(FixedClock::new(now));
    let service = ChoreService::in_memory(store.clone(), clock, EngineConfig::default());
    Harness {
        store,
        service,
        members,
    }
}

fn pending_in_series(store: &InMemoryStore, series: TaskId) -> Vec<Task> {
    store
        .find_by_filter(&TaskFilter {
            statuses: vec![TaskStatus::Pending],
            series: Some(series),
            ..TaskFilter::default()
        })
        .unwrap()
}

#[test]
fn test_creating_scheduled_task_seeds_a_year() {
    let h = harness(at(2025, 1, 15, 9, 0));
    let task = h
        .service
        .create_task(
            Task::new("Bins")
                .due_on(date(2025, 1, 15))
                .recurring(Recurrence::Weekly {
                    interval: 1,
                    days: vec![],
                }),
        )
        .unwrap();

    assert_eq!(task.series_id, Some(task.id));
    let pending = pending_in_series(&h.store, task.id);
    // The task itself plus 52 weekly instances before 2026-01-15.
    assert_eq!(pending.len(), 53);
    assert_eq!(pending.last().unwrap().due_date, Some(date(2026, 1, 14)));
    assert!(pending.iter().all(|t| t.assigned_to.is_some()));
}

#[test]
fn test_seeding_twice_creates_nothing_new() {
    let h = harness(at(2025, 1, 15, 9, 0));
    let task = h
        .service
        .create_task(
            Task::new("Plants")
                .due_on(date(2025, 1, 15))
                .recurring(Recurrence::Daily { interval: 2 }),
        )
        .unwrap();
    let horizon = h.service.seed_horizon();

    let before: Vec<_> = pending_in_series(&h.store, task.id)
        .into_iter()
        .map(|t| t.due_date)
        .collect();
    let again = h.service.seed_future_occurrences(&task, horizon).unwrap();
    assert!(again.is_empty());
    let again = h.service.seed_future_occurrences(&task, horizon).unwrap();
    assert!(again.is_empty());

    let after: Vec<_> = pending_in_series(&h.store, task.id)
        .into_iter()
        .map(|t| t.due_date)
        .collect();
    assert_eq!(before, after);

    let unique: HashSet<_> = after.iter().collect();
    assert_eq!(unique.len(), after.len());
}

#[test]
fn test_seeding_extends_to_a_further_horizon_without_duplicates() {
    let h = harness(at(2025, 1, 15, 9, 0));
    let mut task = Task::new("Litter")
        .due_on(date(2025, 1, 15))
        .recurring(Recurrence::Daily { interval: 1 });
    task.series_id = Some(task.id);
    h.store.insert_task(task.clone()).unwrap();

    let first = h.service.seed_future_occurrences(&task, date(2025, 1, 20)).unwrap();
    assert_eq!(first.len(), 4);
    let second = h.service.seed_future_occurrences(&task, date(2025, 1, 25)).unwrap();
    let dates: Vec<_> = second.iter().filter_map(|t| t.due_date).collect();
    assert_eq!(
        dates,
        vec![date(2025, 1, 20), date(2025, 1, 21), date(2025, 1, 22), date(2025, 1, 23), date(2025, 1, 24)]
    );
}

#[test]
fn test_past_dates_are_skipped() {
    let h = harness(at(2025, 1, 15, 9, 0));
    let legacy = Task::new("Old chore")
        .due_on(date(2024, 12, 1))
        .recurring(Recurrence::Daily { interval: 1 });
    h.store.insert_task(legacy.clone()).unwrap();

    let created = h.service.seed_future_occurrences(&legacy, date(2025, 1, 20)).unwrap();
    let dates: Vec<_> = created.iter().filter_map(|t| t.due_date).collect();
    assert_eq!(
        dates,
        vec![date(2025, 1, 15), date(2025, 1, 16), date(2025, 1, 17), date(2025, 1, 18), date(2025, 1, 19)]
    );

    let saved = h.store.find_by_id(legacy.id).unwrap().unwrap();
    assert_eq!(saved.series_id, Some(legacy.id));
}

#[test]
fn test_elapsed_due_time_today_is_skipped() {
    let h = harness(at(2025, 1, 15, 9, 0));
    let legacy = Task::new("Morning meds")
        .due_on(date(2025, 1, 10))
        .due_at(NaiveTime::from_hms_opt(8, 0, 0).unwrap())
        .recurring(Recurrence::Daily { interval: 1 });
    h.store.insert_task(legacy.clone()).unwrap();

    let created = h.service.seed_future_occurrences(&legacy, date(2025, 1, 18)).unwrap();
    let dates: Vec<_> = created.iter().filter_map(|t| t.due_date).collect();
    assert_eq!(dates, vec![date(2025, 1, 16), date(2025, 1, 17)]);
    assert!(created
        .iter()
        .all(|t| t.due_time == NaiveTime::from_hms_opt(8, 0, 0)));
}

#[test]
fn test_seeding_skips_tasks_it_cannot_schedule() {
    let h = harness(at(2025, 1, 15, 9, 0));
    let horizon = date(2025, 6, 1);

    let on_complete = Task::new("Filter")
        .due_on(date(2025, 1, 15))
        .recurring(Recurrence::Daily { interval: 1 })
        .recur_on_complete(true);
    let undated = Task::new("Someday").recurring(Recurrence::Daily { interval: 1 });
    let once = Task::new("Once").due_on(date(2025, 1, 15));

    for task in [on_complete, undated, once] {
        h.store.insert_task(task.clone()).unwrap();
        let created = h.service.seed_future_occurrences(&task, horizon).unwrap();
        assert!(created.is_empty(), "{} should not seed", task.name);
        let saved = h.store.find_by_id(task.id).unwrap().unwrap();
        assert_eq!(saved.series_id, None);
    }
}

#[test]
fn test_seeding_is_bounded_per_call() {
    let h = harness(at(2025, 1, 15, 9, 0));
    let task = Task::new("Daily")
        .due_on(date(2025, 1, 15))
        .recurring(Recurrence::Calendar);
    h.store.insert_task(task.clone()).unwrap();

    let created = h.service.seed_future_occurrences(&task, date(2035, 1, 1)).unwrap();
    assert_eq!(created.len(), 366);
}

#[test]
fn test_seeded_instances_continue_the_rotation() {
    let h = harness(at(2025, 1, 15, 9, 0));
    let task = h
        .service
        .create_task(
            Task::new("Dishes")
                .due_on(date(2025, 1, 15))
                .recurring(Recurrence::Daily { interval: 1 }),
        )
        .unwrap();

    let pending = pending_in_series(&h.store, task.id);
    let ids: Vec<_> = h.members.iter().map(|m| m.id).collect();
    for (i, instance) in pending.iter().take(7).enumerate() {
        assert_eq!(instance.assigned_to, Some(ids[i % 3]), "instance {i}");
    }
}

#[test]
fn test_seeded_instances_inherit_eligible_pool() {
    let h = harness(at(2025, 1, 15, 9, 0));
    let pool = vec![h.members[1].id, h.members[2].id];
    let task = h
        .service
        .create_task(
            Task::new("Car wash")
                .due_on(date(2025, 1, 15))
                .recurring(Recurrence::Weekly {
                    interval: 1,
                    days: vec!["saturday".into()],
                })
                .eligible(pool.clone()),
        )
        .unwrap();

    let pending = pending_in_series(&h.store, task.id);
    assert!(pending.len() > 1);
    for instance in pending {
        assert_eq!(h.store.eligible_pool(instance.id).unwrap(), pool);
        assert_ne!(instance.assigned_to, Some(h.members[0].id));
    }
}
