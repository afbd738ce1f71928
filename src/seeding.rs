//! Pre-materialization of scheduled recurring chores.
//!
//! A chore on a fixed schedule gets real pending rows created ahead of time,
//! up to a horizon, so upcoming instances show up in lists before the current
//! one is done. Seeding resumes from the furthest pending instance already in
//! the series, which makes repeated calls with the same horizon idempotent.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::Result;
use crate::models::Task;
use crate::overdue::due_has_passed;
use crate::recurrence::{next_occurrence, MAX_EXPANSION_ITERATIONS};
use crate::rotation::AssignmentRotator;
use crate::storage::TaskStore;

#[derive(Clone)]
pub struct FutureOccurrenceSeeder {
    tasks: Arc<dyn TaskStore>,
    rotator: AssignmentRotator,
    clock: Arc<dyn Clock>,
    max_iterations: usize,
}

impl FutureOccurrenceSeeder {
    pub fn new(tasks: Arc<dyn TaskStore>, rotator: AssignmentRotator, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks,
            rotator,
            clock,
            max_iterations: MAX_EXPANSION_ITERATIONS,
        }
    }

    /// Lowers the per-call loop bound. Values above [`MAX_EXPANSION_ITERATIONS`] are capped.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.min(MAX_EXPANSION_ITERATIONS);
        self
    }

    /// Creates pending instances of `task`'s series due before `horizon`.
    ///
    /// No-op for non-recurring, completion-anchored or undated tasks. Dates
    /// already in the past are skipped. Every created instance is assigned
    /// right away, continuing the rotation of the instance before it.
    /// Returns the created instances.
    pub fn seed(&self, task: &Task, horizon: NaiveDate) -> Result<Vec<Task>> {
        if !task.is_scheduled() || task.due_date.is_none() {
            return Ok(Vec::new());
        }

        let mut parent = task.clone();
        if parent.series_id.is_none() {
            parent.series_id = Some(parent.id);
            self.tasks.update(&parent)?;
            debug!(task_id = %parent.id, "series started");
        }
        let series = parent.series_or_self();

        let now = self.clock.now();
        let resume = match self
            .tasks
            .find_last_future_pending_in_series(series, now.date())?
        {
            Some(last) if last.due_date > parent.due_date => last,
            _ => parent.clone(),
        };
        let Some(mut current) = resume.due_date else {
            return Ok(Vec::new());
        };
        let pool = self.tasks.eligible_pool(parent.id)?;
        let mut cursor = resume.rotation_cursor;

        let mut created = Vec::new();
        for _ in 0..self.max_iterations {
            let next = next_occurrence(current, &parent.recurrence)?;
            if next >= horizon {
                break;
            }
            current = next;
            if due_has_passed(next, parent.due_time, now) {
                continue;
            }

            let mut instance = parent.next_instance(next);
            instance.rotation_cursor = cursor;
            let instance = self.tasks.create(instance)?;
            if !pool.is_empty() {
                self.tasks.set_eligible_pool(instance.id, &pool)?;
            }
            let assigned = self.rotator.assign_next(instance)?;
            cursor = assigned.rotation_cursor;
            created.push(assigned);
        }

        if !created.is_empty() {
            info!(series_id = %series, created = created.len(), %horizon, "seeded future occurrences");
        }
        Ok(created)
    }
}
