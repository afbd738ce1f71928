//! Round-robin assignment of chores to household members.
//!
//! Each task carries a rotation cursor: the pool index of its last assignee.
//! The next assignment starts one past the cursor and walks the pool,
//! preferring members with no overdue chores. If everyone is behind, the
//! plain round-robin pick wins so a chore is never left unassigned.

use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{ChoreError, Result};
use crate::models::{Assignment, Member, Task, TaskStatus};
use crate::storage::{AssignmentStore, MemberStore, TaskStore};

#[derive(Clone)]
pub struct AssignmentRotator {
    tasks: Arc<dyn TaskStore>,
    assignments: Arc<dyn AssignmentStore>,
    members: Arc<dyn MemberStore>,
    clock: Arc<dyn Clock>,
}

impl AssignmentRotator {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        assignments: Arc<dyn AssignmentStore>,
        members: Arc<dyn MemberStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            assignments,
            members,
            clock,
        }
    }

    /// Members who may receive `task`, in stable household order.
    ///
    /// The task's eligible pool restricts the household when non-empty.
    /// Eligible ids that no longer belong to the household are ignored.
    pub fn candidate_pool(&self, task: &Task) -> Result<Vec<Member>> {
        let eligible = self.tasks.eligible_pool(task.id)?;
        let members = self.members.list_all()?;
        if eligible.is_empty() {
            return Ok(members);
        }
        Ok(members
            .into_iter()
            .filter(|m| eligible.contains(&m.id))
            .collect())
    }

    /// Hands `task` to the next member in rotation and persists the result.
    ///
    /// Closes the previous open assignment as reassigned when the task already
    /// had an assignee, opens a new one, and stores the updated cursor.
    pub fn assign_next(&self, mut task: Task) -> Result<Task> {
        let pool = self.candidate_pool(&task)?;
        if pool.is_empty() {
            return Err(ChoreError::NoCandidates { task: task.id });
        }

        let size = pool.len();
        let start = next_cursor(task.rotation_cursor, size);
        let mut chosen = None;
        for offset in 0..size {
            let index = (start + offset) % size;
            let overdue = self
                .tasks
                .count_by_status_and_assignee(TaskStatus::Overdue, pool[index].id)?;
            if overdue == 0 {
                chosen = Some(index);
                break;
            }
            debug!(task_id = %task.id, member_id = %pool[index].id, overdue, "skipping member with overdue chores");
        }
        let index = chosen.unwrap_or_else(|| {
            debug!(task_id = %task.id, "every candidate has overdue chores, using plain rotation");
            start
        });
        let member = &pool[index];

        if task.assigned_to.is_some() {
            self.assignments.mark_reassigned(task.id)?;
        }
        task.assigned_to = Some(member.id);
        task.rotation_cursor = index as i64;

        self.assignments
            .create(Assignment::open(task.id, member.id, self.clock.now()))?;
        self.tasks.update(&task)?;

        info!(task_id = %task.id, member_id = %member.id, member = %member.name, "assigned task");
        Ok(task)
    }
}

/// Pool index one past `cursor`, wrapping. Negative cursors start at zero.
pub fn next_cursor(cursor: i64, pool_size: usize) -> usize {
    if pool_size == 0 {
        return 0;
    }
    let size = pool_size as i64;
    ((cursor.rem_euclid(size) + 1) % size) as usize
}
