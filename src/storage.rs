//! Storage contracts consumed by the engine, plus an in-memory implementation.
//!
//! The engine never talks to a database directly. It reads and writes tasks,
//! assignment history and the member list through [`TaskStore`],
//! [`AssignmentStore`] and [`MemberStore`]. Implementations are expected to
//! provide read-then-write consistency per record update; nothing more.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::StoreError;
use crate::models::{Assignment, AssignmentStatus, Member, MemberId, Task, TaskId, TaskStatus};
use crate::recurrence::RecurrenceKind;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Selection criteria for [`TaskStore::find_by_filter`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub statuses: Vec<TaskStatus>,
    pub recurrence_kinds: Vec<RecurrenceKind>,
    pub assignee: Option<MemberId>,
    /// Inclusive lower bound on the due date.
    pub due_on_or_after: Option<NaiveDate>,
    /// Exclusive upper bound on the due date.
    pub due_before: Option<NaiveDate>,
    pub series: Option<TaskId>,
}

impl TaskFilter {
    /// Whether `task` satisfies every populated criterion.
    ///
    /// A date bound excludes tasks without a due date.
    pub fn matches(&self, task: &Task) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return false;
        }
        if !self.recurrence_kinds.is_empty()
            && !self.recurrence_kinds.contains(&task.recurrence.kind())
        {
            return false;
        }
        if self.assignee.is_some() && task.assigned_to != self.assignee {
            return false;
        }
        if self.series.is_some() && task.series_id != self.series {
            return false;
        }
        if let Some(start) = self.due_on_or_after {
            if !task.due_date.is_some_and(|due| due >= start) {
                return false;
            }
        }
        if let Some(end) = self.due_before {
            if !task.due_date.is_some_and(|due| due < end) {
                return false;
            }
        }
        true
    }
}

pub trait TaskStore: Send + Sync {
    fn find_by_id(&self, id: TaskId) -> StoreResult<Option<Task>>;

    /// Tasks matching `filter`, ordered by due date (undated last), then name.
    fn find_by_filter(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>>;

    fn create(&self, task: Task) -> StoreResult<Task>;

    fn update(&self, task: &Task) -> StoreResult<()>;

    fn delete(&self, id: TaskId) -> StoreResult<()>;

    fn count_by_status_and_assignee(&self, status: TaskStatus, member: MemberId) -> StoreResult<usize>;

    fn eligible_pool(&self, id: TaskId) -> StoreResult<Vec<MemberId>>;

    fn set_eligible_pool(&self, id: TaskId, members: &[MemberId]) -> StoreResult<()>;

    /// Deletes pending tasks in `series` due on or after `from`, except `keep`.
    /// Returns how many were removed.
    fn delete_future_pending_in_series(
        &self,
        series: TaskId,
        from: NaiveDate,
        keep: TaskId,
    ) -> StoreResult<usize>;

    /// The pending task in `series` with the latest due date on or after `from`.
    fn find_last_future_pending_in_series(
        &self,
        series: TaskId,
        from: NaiveDate,
    ) -> StoreResult<Option<Task>>;
}

pub trait AssignmentStore: Send + Sync {
    fn create(&self, assignment: Assignment) -> StoreResult<Assignment>;

    /// Closes the open assignment of `task` as completed by `member`.
    fn mark_completed(&self, task: TaskId, member: MemberId, at: NaiveDateTime) -> StoreResult<()>;

    /// Closes the open assignment of `task` as reassigned.
    fn mark_reassigned(&self, task: TaskId) -> StoreResult<()>;

    /// Assignment history of `task`, oldest first.
    fn for_task(&self, task: TaskId) -> StoreResult<Vec<Assignment>>;
}

pub trait MemberStore: Send + Sync {
    /// All household members in a stable order.
    fn list_all(&self) -> StoreResult<Vec<Member>>;
}

/// Process-local store implementing all three contracts.
///
/// Members keep insertion order, which is the rotation order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    assignments: RwLock<Vec<Assignment>>,
    members: RwLock<Vec<Member>>,
}

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, member: Member) -> StoreResult<Member> {
        write(&self.members)?.push(member.clone());
        Ok(member)
    }

    pub fn remove_member(&self, id: MemberId) -> StoreResult<()> {
        write(&self.members)?.retain(|m| m.id != id);
        Ok(())
    }

    /// Inserts or replaces a task as-is, bypassing engine logic.
    pub fn insert_task(&self, task: Task) -> StoreResult<()> {
        write(&self.tasks)?.insert(task.id, task);
        Ok(())
    }

    pub fn all_tasks(&self) -> StoreResult<Vec<Task>> {
        self.find_by_filter(&TaskFilter::default())
    }
}

impl TaskStore for InMemoryStore {
    fn find_by_id(&self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(read(&self.tasks)?.get(&id).cloned())
    }

    fn find_by_filter(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let mut found: Vec<Task> = read(&self.tasks)?
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        found.sort_by(|a, b| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        });
        Ok(found)
    }

    fn create(&self, task: Task) -> StoreResult<Task> {
        let mut tasks = write(&self.tasks)?;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Backend(format!("task {} already exists", task.id)));
        }
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn update(&self, task: &Task) -> StoreResult<()> {
        match write(&self.tasks)?.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("task {}", task.id))),
        }
    }

    fn delete(&self, id: TaskId) -> StoreResult<()> {
        write(&self.tasks)?.remove(&id);
        Ok(())
    }

    fn count_by_status_and_assignee(&self, status: TaskStatus, member: MemberId) -> StoreResult<usize> {
        Ok(read(&self.tasks)?
            .values()
            .filter(|t| t.status == status && t.assigned_to == Some(member))
            .count())
    }

    fn eligible_pool(&self, id: TaskId) -> StoreResult<Vec<MemberId>> {
        read(&self.tasks)?
            .get(&id)
            .map(|t| t.eligible_assignees.clone())
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))
    }

    fn set_eligible_pool(&self, id: TaskId, members: &[MemberId]) -> StoreResult<()> {
        match write(&self.tasks)?.get_mut(&id) {
            Some(task) => {
                task.eligible_assignees = members.to_vec();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("task {id}"))),
        }
    }

    fn delete_future_pending_in_series(
        &self,
        series: TaskId,
        from: NaiveDate,
        keep: TaskId,
    ) -> StoreResult<usize> {
        let mut tasks = write(&self.tasks)?;
        let before = tasks.len();
        tasks.retain(|id, t| {
            let stale = *id != keep
                && t.series_id == Some(series)
                && t.status == TaskStatus::Pending
                && t.due_date.is_some_and(|due| due >= from);
            !stale
        });
        Ok(before - tasks.len())
    }

    fn find_last_future_pending_in_series(
        &self,
        series: TaskId,
        from: NaiveDate,
    ) -> StoreResult<Option<Task>> {
        Ok(read(&self.tasks)?
            .values()
            .filter(|t| {
                t.series_id == Some(series)
                    && t.status == TaskStatus::Pending
                    && t.due_date.is_some_and(|due| due >= from)
            })
            .max_by_key(|t| t.due_date)
            .cloned())
    }
}

impl AssignmentStore for InMemoryStore {
    fn create(&self, assignment: Assignment) -> StoreResult<Assignment> {
        write(&self.assignments)?.push(assignment.clone());
        Ok(assignment)
    }

    fn mark_completed(&self, task: TaskId, member: MemberId, at: NaiveDateTime) -> StoreResult<()> {
        let mut assignments = write(&self.assignments)?;
        let open = assignments
            .iter_mut()
            .filter(|a| a.task_id == task && a.status == AssignmentStatus::Assigned);
        for assignment in open {
            if assignment.member_id != member {
                tracing::debug!(task_id = %task, assignee = %assignment.member_id, completed_by = %member, "task completed by someone other than its assignee");
            }
            assignment.status = AssignmentStatus::Completed;
            assignment.completed_at = Some(at);
        }
        Ok(())
    }

    fn mark_reassigned(&self, task: TaskId) -> StoreResult<()> {
        write(&self.assignments)?
            .iter_mut()
            .filter(|a| a.task_id == task && a.status == AssignmentStatus::Assigned)
            .for_each(|a| a.status = AssignmentStatus::Reassigned);
        Ok(())
    }

    fn for_task(&self, task: TaskId) -> StoreResult<Vec<Assignment>> {
        Ok(read(&self.assignments)?
            .iter()
            .filter(|a| a.task_id == task)
            .cloned()
            .collect())
    }
}

impl MemberStore for InMemoryStore {
    fn list_all(&self) -> StoreResult<Vec<Member>> {
        Ok(read(&self.members)?.clone())
    }
}
