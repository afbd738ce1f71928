//! Overdue evaluation and the background sweep that applies it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::Result;
use crate::models::{Task, TaskStatus};
use crate::storage::{TaskFilter, TaskStore};

/// Default period between overdue sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Shortest period the sweeper accepts.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Whether a due date, optionally refined by a time of day, lies in the past.
///
/// Earlier days have always passed. On the due day itself only an elapsed
/// due time counts; a task due today without a time is still current.
pub fn due_has_passed(due_date: NaiveDate, due_time: Option<NaiveTime>, now: NaiveDateTime) -> bool {
    let today = now.date();
    if due_date < today {
        return true;
    }
    if due_date == today {
        if let Some(time) = due_time {
            return now.time() > time;
        }
    }
    false
}

/// A pending task whose due moment has passed.
pub fn is_overdue(task: &Task, now: NaiveDateTime) -> bool {
    if task.status != TaskStatus::Pending {
        return false;
    }
    match task.due_date {
        Some(due) => due_has_passed(due, task.due_time, now),
        None => false,
    }
}

/// Flips every overdue pending task to `Overdue`. Returns how many changed.
///
/// Only `Pending` tasks are selected, so running it again is a no-op.
pub fn sweep_overdue(tasks: &dyn TaskStore, now: NaiveDateTime) -> Result<usize> {
    let filter = TaskFilter {
        statuses: vec![TaskStatus::Pending],
        due_before: now.date().checked_add_days(Days::new(1)),
        ..TaskFilter::default()
    };

    let mut flipped = 0;
    for mut task in tasks.find_by_filter(&filter)? {
        if !is_overdue(&task, now) {
            continue;
        }
        task.status = TaskStatus::Overdue;
        tasks.update(&task)?;
        debug!(task_id = %task.id, name = %task.name, "task is now overdue");
        flipped += 1;
    }
    if flipped > 0 {
        info!(count = flipped, "marked tasks overdue");
    }
    Ok(flipped)
}

/// Periodically runs [`sweep_overdue`] until cancelled.
pub struct OverdueSweeper {
    tasks: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    interval: Duration,
}

impl OverdueSweeper {
    pub fn new(tasks: Arc<dyn TaskStore>, clock: Arc<dyn Clock>, cancel: CancellationToken) -> Self {
        Self {
            tasks,
            clock,
            cancel,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Sets the sweep period. Anything shorter than [`MIN_SWEEP_INTERVAL`] is raised to it.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_SWEEP_INTERVAL);
        self
    }

    /// Run the sweep loop. The first sweep happens immediately.
    ///
    /// ```rust,ignore
    /// let sweeper = service.overdue_sweeper(cancel.child_token());
    /// tokio::spawn(sweeper.run());
    /// ```
    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "overdue sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("overdue sweeper cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = sweep_overdue(self.tasks.as_ref(), self.clock.now()) {
                        error!(error = %e, "updating overdue tasks");
                    }
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current tokio runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
