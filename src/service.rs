//! Chore lifecycle orchestration.
//!
//! [`ChoreService`] ties the pieces together: creation assigns and seeds,
//! completion closes the assignment and schedules what comes next, recurrence
//! edits replace stale future instances, and the overdue sweep demotes late
//! chores. Work on one series is serialized through a keyed lock so two
//! completions in the same series cannot interleave their cursor and series
//! updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Months, NaiveDate, NaiveDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{ChoreError, Result};
use crate::models::{MemberId, Task, TaskId, TaskStatus};
use crate::overdue::{self, OverdueSweeper};
use crate::recurrence::{self, calculate_next_due_date, Recurrence, RecurrenceKind, VirtualOccurrence};
use crate::rotation::AssignmentRotator;
use crate::seeding::FutureOccurrenceSeeder;
use crate::storage::{AssignmentStore, InMemoryStore, MemberStore, TaskFilter, TaskStore};

/// One mutex per series, created on first use and dropped when idle.
#[derive(Default)]
struct SeriesLocks {
    locks: Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
}

impl SeriesLocks {
    /// Runs `f` while holding the lock of `series`.
    fn with_lock<T>(&self, series: TaskId, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(series).or_default())
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };

        // Clones are only taken under the map lock, so a count of two (map
        // plus ours) means nobody else holds or waits on this entry.
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(&series)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(&series);
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Outcome of the one-time series backfill.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    /// Tasks that received a series and were seeded.
    pub seeded: usize,
    /// Instances created across all seeded tasks.
    pub instances: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ChoreService {
    tasks: Arc<dyn TaskStore>,
    assignments: Arc<dyn AssignmentStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    rotator: AssignmentRotator,
    seeder: FutureOccurrenceSeeder,
    series_locks: Arc<SeriesLocks>,
}

impl ChoreService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        assignments: Arc<dyn AssignmentStore>,
        members: Arc<dyn MemberStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let rotator = AssignmentRotator::new(
            Arc::clone(&tasks),
            Arc::clone(&assignments),
            members,
            Arc::clone(&clock),
        );
        let seeder = FutureOccurrenceSeeder::new(Arc::clone(&tasks), rotator.clone(), Arc::clone(&clock))
            .with_max_iterations(config.max_expansion_iterations);
        Self {
            tasks,
            assignments,
            clock,
            config,
            rotator,
            seeder,
            series_locks: Arc::new(SeriesLocks::default()),
        }
    }

    /// Service backed entirely by one [`InMemoryStore`].
    pub fn in_memory(store: Arc<InMemoryStore>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self::new(store.clone(), store.clone(), store, clock, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Date up to which scheduled series are kept materialized.
    pub fn seed_horizon(&self) -> NaiveDate {
        let today = self.clock.today();
        today
            .checked_add_months(Months::new(self.config.seed_horizon_months))
            .unwrap_or(NaiveDate::MAX)
    }

    fn find(&self, id: TaskId) -> Result<Task> {
        self.tasks
            .find_by_id(id)?
            .ok_or(ChoreError::TaskNotFound { task: id })
    }

    /// Persists a new task, assigns it, and seeds its schedule if it has one.
    ///
    /// Assignment failures are returned; seeding failures are only logged.
    pub fn create_task(&self, mut task: Task) -> Result<Task> {
        if task.is_scheduled() && task.series_id.is_none() {
            task.series_id = Some(task.id);
        }
        let pool = task.eligible_assignees.clone();
        let created = self.tasks.create(task)?;
        self.tasks.set_eligible_pool(created.id, &pool)?;
        let assigned = self.rotator.assign_next(created)?;
        info!(task_id = %assigned.id, name = %assigned.name, recurrence = %assigned.recurrence, "created task");

        if assigned.is_scheduled() {
            self.series_locks
                .with_lock(assigned.series_or_self(), || self.seed_best_effort(&assigned));
        }
        Ok(assigned)
    }

    /// Reassigns `task` to the next member in rotation.
    pub fn assign_next(&self, task: Task) -> Result<Task> {
        self.rotator.assign_next(task)
    }

    /// Marks a task completed by `member` and schedules the next instance.
    ///
    /// Completion-anchored tasks get exactly one new sibling, and failures
    /// creating it are returned. Scheduled tasks top up their seeded horizon
    /// instead, best-effort.
    pub fn complete_task(&self, id: TaskId, member: MemberId) -> Result<Task> {
        let series = self.find(id)?.series_or_self();
        self.series_locks
            .with_lock(series, || self.complete_locked(id, member))
    }

    fn complete_locked(&self, id: TaskId, member: MemberId) -> Result<Task> {
        let mut task = self.find(id)?;
        if task.status == TaskStatus::Completed {
            return Err(ChoreError::AlreadyCompleted { task: id });
        }

        let now = self.clock.now();
        task.mark_completed(member, now);
        if task.is_recurring() && task.series_id.is_none() {
            task.series_id = Some(task.id);
        }
        self.tasks.update(&task)?;
        self.assignments.mark_completed(task.id, member, now)?;
        info!(task_id = %task.id, member_id = %member, "completed task");

        if task.recur_on_complete {
            self.create_next_recurrence(&task, now)?;
        } else if task.is_recurring() {
            self.seed_best_effort(&task);
        }
        Ok(task)
    }

    /// Creates and assigns the single sibling that follows a completed task.
    fn create_next_recurrence(&self, task: &Task, completed_at: NaiveDateTime) -> Result<Option<Task>> {
        let Some(due) = calculate_next_due_date(task, completed_at, self.clock.now())? else {
            return Ok(None);
        };

        let mut parent = task.clone();
        if parent.series_id.is_none() {
            parent.series_id = Some(parent.id);
            self.tasks.update(&parent)?;
        }

        let created = self.tasks.create(parent.next_instance(due))?;
        let pool = self.tasks.eligible_pool(parent.id)?;
        if !pool.is_empty() {
            self.tasks.set_eligible_pool(created.id, &pool)?;
        }
        let assigned = self.rotator.assign_next(created)?;
        info!(task_id = %assigned.id, series_id = %assigned.series_or_self(), due = %due, "created next recurrence");
        Ok(Some(assigned))
    }

    /// Next due date for `task` if it were completed at `completed_at`.
    pub fn next_due_date(&self, task: &Task, completed_at: NaiveDateTime) -> Result<Option<NaiveDate>> {
        calculate_next_due_date(task, completed_at, self.clock.now())
    }

    /// Seeds `task`'s series up to `horizon`, returning the created instances.
    pub fn seed_future_occurrences(&self, task: &Task, horizon: NaiveDate) -> Result<Vec<Task>> {
        self.series_locks
            .with_lock(task.series_or_self(), || self.seeder.seed(task, horizon))
    }

    /// Caller must hold the series lock.
    fn seed_best_effort(&self, task: &Task) {
        if let Err(e) = self.seeder.seed(task, self.seed_horizon()) {
            warn!(task_id = %task.id, series_id = %task.series_or_self(), error = %e, "seeding future occurrences");
        }
    }

    /// Replaces a task's recurrence settings.
    ///
    /// Completed tasks are final and are rejected with
    /// [`ChoreError::AlreadyCompleted`]. When the settings actually change,
    /// pending instances of the series due today or later (other than this
    /// task) are dropped and, for a fixed schedule, re-seeded from this task.
    /// Cleanup and re-seeding are best-effort.
    pub fn change_recurrence(&self, id: TaskId, recurrence: Recurrence, recur_on_complete: bool) -> Result<Task> {
        let series = self.find(id)?.series_or_self();
        self.series_locks.with_lock(series, || {
            self.change_recurrence_locked(id, recurrence, recur_on_complete)
        })
    }

    fn change_recurrence_locked(&self, id: TaskId, recurrence: Recurrence, recur_on_complete: bool) -> Result<Task> {
        let mut task = self.find(id)?;
        if task.status == TaskStatus::Completed {
            return Err(ChoreError::AlreadyCompleted { task: id });
        }
        let changed = task.recurrence != recurrence || task.recur_on_complete != recur_on_complete;
        task.recurrence = recurrence;
        task.recur_on_complete = recur_on_complete;
        self.tasks.update(&task)?;
        if !changed {
            return Ok(task);
        }

        if let Some(series) = task.series_id {
            match self
                .tasks
                .delete_future_pending_in_series(series, self.clock.today(), task.id)
            {
                Ok(removed) => info!(series_id = %series, removed, "removed stale future instances"),
                Err(e) => {
                    error!(series_id = %series, error = %e, "deleting stale future instances");
                    return Ok(task);
                }
            }
        }
        if task.is_scheduled() {
            self.seed_best_effort(&task);
        }
        self.find(id)
    }

    /// Deletes a task together with the pending instances queued after it.
    pub fn delete_task(&self, id: TaskId) -> Result<()> {
        let task = self.find(id)?;
        self.series_locks.with_lock(task.series_or_self(), || -> Result<()> {
            if let Some(series) = task.series_id {
                if let Err(e) = self
                    .tasks
                    .delete_future_pending_in_series(series, self.clock.today(), task.id)
                {
                    error!(series_id = %series, error = %e, "deleting future pending siblings");
                }
            }
            self.tasks.delete(id)?;
            info!(task_id = %id, "deleted task");
            Ok(())
        })
    }

    /// One-time startup migration for recurring tasks that predate series tracking.
    ///
    /// Seeds every pending or overdue fixed-schedule task that has a due date
    /// but no series. Seeding gives each one a series, so a second run finds
    /// nothing to do.
    pub fn backfill_series(&self, horizon: NaiveDate) -> Result<BackfillReport> {
        let filter = TaskFilter {
            statuses: vec![TaskStatus::Pending, TaskStatus::Overdue],
            recurrence_kinds: RecurrenceKind::RECURRING.to_vec(),
            ..TaskFilter::default()
        };

        let mut report = BackfillReport::default();
        for task in self.tasks.find_by_filter(&filter)? {
            if task.series_id.is_some() || task.recur_on_complete || task.due_date.is_none() {
                continue;
            }
            match self.seed_future_occurrences(&task, horizon) {
                Ok(created) => {
                    report.seeded += 1;
                    report.instances += created.len();
                }
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "seeding existing task");
                    report.failed += 1;
                }
            }
        }
        if report.seeded > 0 || report.failed > 0 {
            info!(seeded = report.seeded, instances = report.instances, failed = report.failed, "series backfill finished");
        }
        Ok(report)
    }

    /// Demotes pending tasks whose due moment has passed. Returns how many changed.
    pub fn sweep_overdue(&self) -> Result<usize> {
        overdue::sweep_overdue(self.tasks.as_ref(), self.clock.now())
    }

    /// Background sweeper using the configured interval.
    pub fn overdue_sweeper(&self, cancel: CancellationToken) -> OverdueSweeper {
        OverdueSweeper::new(Arc::clone(&self.tasks), Arc::clone(&self.clock), cancel)
            .with_interval(self.config.sweep_interval())
    }

    /// Display-only future dates of `task` within `[start, end)`.
    pub fn expand(&self, task: &Task, start: NaiveDate, end: NaiveDate) -> Vec<VirtualOccurrence> {
        recurrence::expand_bounded(task, start, end, self.config.max_expansion_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_lock_entries_are_dropped_after_use() {
        let locks = SeriesLocks::default();
        let series = TaskId::new();

        let inside = locks.with_lock(series, || locks.len());
        assert_eq!(inside, 1);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn series_lock_entry_survives_while_shared() {
        let locks = Arc::new(SeriesLocks::default());
        let series = TaskId::new();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let holder = {
            let locks = Arc::clone(&locks);
            std::thread::spawn(move || {
                locks.with_lock(series, || {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
            })
        };
        entered_rx.recv().unwrap();
        assert_eq!(locks.len(), 1);

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(locks.len(), 0);
    }
}
