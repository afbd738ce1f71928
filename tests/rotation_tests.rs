use std::sync::Arc;

use chorely::rotation::AssignmentRotator;
use chorely::storage::AssignmentStore;
use chorely::{
    AssignmentStatus, ChoreError, FixedClock, InMemoryStore, Member, MemberId, Task, TaskStatus,
};
use chrono::NaiveDate;

fn setup(names: &[&str]) -> (Arc<InMemoryStore>, AssignmentRotator, Vec<Member>) {
    let store = Arc::new(InMemoryStore::new());
    let members = names
        .iter()
        .map(|name| store.add_member(Member::new(*name)).unwrap())
        .collect();
    let clock = Arc::new(FixedClock::new(
        NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap(),
    ));
    let rotator = AssignmentRotator::new(store.clone(), store.clone(), store.clone(), clock);
    (store, rotator, members)
}

fn stored(store: &InMemoryStore, task: Task) -> Task {
    store.insert_task(task.clone()).unwrap();
    task
}

fn give_overdue_task(store: &InMemoryStore, member: MemberId) {
    let mut task = Task::new("Late chore").due_on(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    task.status = TaskStatus::Overdue;
    task.assigned_to = Some(member);
    store.insert_task(task).unwrap();
}

#[test]
fn test_rotation_visits_everyone_once() {
    let (store, rotator, members) = setup(&["Alice", "Bob", "Charlie"]);

    let mut cursor = -1;
    let mut picked = Vec::new();
    for i in 0..4 {
        let mut task = Task::new(format!("Chore {i}"));
        task.rotation_cursor = cursor;
        let assigned = rotator.assign_next(stored(&store, task)).unwrap();
        cursor = assigned.rotation_cursor;
        picked.push(assigned.assigned_to.unwrap());
    }

    let expected: Vec<MemberId> = members.iter().map(|m| m.id).collect();
    assert_eq!(&picked[..3], expected.as_slice());
    assert_eq!(picked[3], picked[0]);
}

#[test]
fn test_member_with_overdue_chores_is_skipped() {
    let (store, rotator, members) = setup(&["Alice", "Bob", "Charlie"]);
    give_overdue_task(&store, members[1].id);

    // Cursor 0 means Bob is next in line.
    let mut task = Task::new("Hoover");
    task.rotation_cursor = 0;
    let assigned = rotator.assign_next(stored(&store, task)).unwrap();

    assert_eq!(assigned.assigned_to, Some(members[2].id));
    assert_eq!(assigned.rotation_cursor, 2);
}

#[test]
fn test_everyone_overdue_falls_back_to_plain_rotation() {
    let (store, rotator, members) = setup(&["Alice", "Bob"]);
    for m in &members {
        give_overdue_task(&store, m.id);
    }

    let mut task = Task::new("Dust");
    task.rotation_cursor = 0;
    let assigned = rotator.assign_next(stored(&store, task)).unwrap();
    assert_eq!(assigned.assigned_to, Some(members[1].id));
    assert_eq!(assigned.rotation_cursor, 1);
}

#[test]
fn test_empty_household_has_no_candidates() {
    let (store, rotator, _) = setup(&[]);
    let task = stored(&store, Task::new("Nobody home"));
    let err = rotator.assign_next(task.clone()).unwrap_err();
    assert!(matches!(err, ChoreError::NoCandidates { task: id } if id == task.id));
}

#[test]
fn test_eligible_pool_keeps_household_order() {
    let (store, rotator, members) = setup(&["Alice", "Bob", "Charlie"]);
    let task = Task::new("Mow lawn").eligible(vec![members[2].id, members[0].id]);
    let task = stored(&store, task);

    let first = rotator.assign_next(task).unwrap();
    assert_eq!(first.assigned_to, Some(members[0].id));
    let second = rotator.assign_next(first).unwrap();
    assert_eq!(second.assigned_to, Some(members[2].id));
    let third = rotator.assign_next(second).unwrap();
    assert_eq!(third.assigned_to, Some(members[0].id));
}

#[test]
fn test_eligible_pool_of_departed_members_is_empty() {
    let (store, rotator, members) = setup(&["Alice", "Bob"]);
    let task = stored(&store, Task::new("Clean gutters").eligible(vec![members[1].id]));
    store.remove_member(members[1].id).unwrap();

    assert!(matches!(
        rotator.assign_next(task),
        Err(ChoreError::NoCandidates { .. })
    ));
}

#[test]
fn test_reassignment_closes_previous_assignment() {
    let (store, rotator, members) = setup(&["Alice", "Bob"]);
    let task = stored(&store, Task::new("Bins"));

    let first = rotator.assign_next(task).unwrap();
    let second = rotator.assign_next(first.clone()).unwrap();
    assert_ne!(first.assigned_to, second.assigned_to);

    let history = store.for_task(second.id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, AssignmentStatus::Reassigned);
    assert_eq!(history[0].member_id, members[0].id);
    assert_eq!(history[1].status, AssignmentStatus::Assigned);
    assert_eq!(history[1].member_id, members[1].id);
}

#[test]
fn test_assignment_is_persisted() {
    let (store, rotator, members) = setup(&["Alice"]);
    let task = stored(&store, Task::new("Towels"));
    rotator.assign_next(task.clone()).unwrap();

    let saved = chorely::storage::TaskStore::find_by_id(store.as_ref(), task.id)
        .unwrap()
        .unwrap();
    assert_eq!(saved.assigned_to, Some(members[0].id));
    assert_eq!(saved.rotation_cursor, 0);
}
