use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recurrence::Recurrence;

/// Identity of a task instance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a household member.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MemberId(pub Uuid);

impl MemberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque reference to a category owned outside the engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CategoryId(pub String);

/// A household member who can receive chores.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
}

impl Member {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: MemberId::new(),
            name: name.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Overdue,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Assigned,
    Completed,
    Reassigned,
}

/// Represents a single chore instance.
///
/// Recurring chores are stored as one row per instance; instances descending
/// from the same originally created chore share a `series_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<CategoryId>,
    /// Member currently responsible for the chore.
    #[serde(default)]
    pub assigned_to: Option<MemberId>,
    /// Index into the candidate pool of the last assignment. Starts at -1 so
    /// the first assignment lands on the first candidate.
    #[serde(default = "initial_cursor")]
    pub rotation_cursor: i64,
    /// Restricted pool of members allowed to take the chore. Empty means everyone.
    #[serde(default)]
    pub eligible_assignees: Vec<MemberId>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Local time of day, serialized as `HH:MM`.
    #[serde(default, with = "hhmm")]
    pub due_time: Option<NaiveTime>,
    #[serde(default)]
    pub recurrence: Recurrence,
    /// Next instance is scheduled from the completion moment instead of the due date.
    #[serde(default)]
    pub recur_on_complete: bool,
    #[serde(default)]
    pub series_id: Option<TaskId>,
    pub status: TaskStatus,
    #[serde(default)]
    pub completed_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub completed_by: Option<MemberId>,
}

fn initial_cursor() -> i64 {
    -1
}

impl Task {
    /// Creates a pending, unassigned, non-recurring task.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            name: name.into(),
            description: String::new(),
            category: None,
            assigned_to: None,
            rotation_cursor: initial_cursor(),
            eligible_assignees: Vec::new(),
            due_date: None,
            due_time: None,
            recurrence: Recurrence::None,
            recur_on_complete: false,
            series_id: None,
            status: TaskStatus::Pending,
            completed_at: None,
            completed_by: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }

    pub fn due_on(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn due_at(mut self, time: NaiveTime) -> Self {
        self.due_time = Some(time);
        self
    }

    pub fn recurring(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = recurrence;
        self
    }

    pub fn recur_on_complete(mut self, recur_on_complete: bool) -> Self {
        self.recur_on_complete = recur_on_complete;
        self
    }

    pub fn eligible(mut self, members: Vec<MemberId>) -> Self {
        self.eligible_assignees = members;
        self
    }

    pub fn is_recurring(&self) -> bool {
        !self.recurrence.is_none()
    }

    /// Recurring on a fixed calendar schedule, the mode that pre-materializes instances.
    pub fn is_scheduled(&self) -> bool {
        self.is_recurring() && !self.recur_on_complete
    }

    /// Due date combined with the due time, or midnight when no time is set.
    pub fn due_moment(&self) -> Option<NaiveDateTime> {
        self.due_date
            .map(|date| date.and_time(self.due_time.unwrap_or(NaiveTime::MIN)))
    }

    /// Series this task belongs to, defaulting to its own identity.
    pub fn series_or_self(&self) -> TaskId {
        self.series_id.unwrap_or(self.id)
    }

    /// Sets status, completion time and completer together.
    pub fn mark_completed(&mut self, by: MemberId, at: NaiveDateTime) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(at);
        self.completed_by = Some(by);
    }

    /// `status = Completed` exactly when both completion fields are present.
    pub fn completion_is_consistent(&self) -> bool {
        let both = self.completed_at.is_some() && self.completed_by.is_some();
        let neither = self.completed_at.is_none() && self.completed_by.is_none();
        match self.status {
            TaskStatus::Completed => both,
            TaskStatus::Pending | TaskStatus::Overdue => neither,
        }
    }

    /// A fresh pending instance of the same chore due on `due_date`.
    ///
    /// Carries over everything that defines the chore plus the rotation cursor,
    /// so the new instance continues the rotation instead of restarting it.
    pub fn next_instance(&self, due_date: NaiveDate) -> Task {
        Task {
            id: TaskId::new(),
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            assigned_to: None,
            rotation_cursor: self.rotation_cursor,
            eligible_assignees: self.eligible_assignees.clone(),
            due_date: Some(due_date),
            due_time: self.due_time,
            recurrence: self.recurrence.clone(),
            recur_on_complete: self.recur_on_complete,
            series_id: self.series_id,
            status: TaskStatus::Pending,
            completed_at: None,
            completed_by: None,
        }
    }
}

/// History record of who held a task and how the holding ended.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub id: Uuid,
    pub task_id: TaskId,
    pub member_id: MemberId,
    pub assigned_at: NaiveDateTime,
    #[serde(default)]
    pub completed_at: Option<NaiveDateTime>,
    pub status: AssignmentStatus,
}

impl Assignment {
    pub fn open(task_id: TaskId, member_id: MemberId, assigned_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            member_id,
            assigned_at,
            completed_at: None,
            status: AssignmentStatus::Assigned,
        }
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serializer.serialize_some(&t.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(s) if !s.trim().is_empty() => NaiveTime::parse_from_str(s.trim(), FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_instance_keeps_series_and_cursor() {
        let mut task = Task::new("Dishes")
            .due_on(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
            .recurring(Recurrence::Daily { interval: 1 });
        task.series_id = Some(task.id);
        task.rotation_cursor = 2;
        task.assigned_to = Some(MemberId::new());

        let next = task.next_instance(NaiveDate::from_ymd_opt(2025, 1, 16).unwrap());
        assert_ne!(next.id, task.id);
        assert_eq!(next.series_id, Some(task.id));
        assert_eq!(next.rotation_cursor, 2);
        assert_eq!(next.assigned_to, None);
        assert_eq!(next.status, TaskStatus::Pending);
    }

    #[test]
    fn due_time_serializes_as_hhmm() {
        let task = Task::new("Bins").due_at(NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["due_time"], "07:30");

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back.due_time, NaiveTime::from_hms_opt(7, 30, 0));
    }

    #[test]
    fn completion_fields_move_together() {
        let mut task = Task::new("Laundry");
        assert!(task.completion_is_consistent());
        task.mark_completed(MemberId::new(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_time(NaiveTime::MIN));
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completion_is_consistent());
    }
}
