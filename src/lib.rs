//! # Chorely
//!
//! The recurrence and fair-assignment engine of a household chore tracker.
//!
//! ## Features
//!
//! *   **Recurrence**: daily, weekly (every N weeks or on listed weekdays),
//!     monthly (optionally pinned to a day of the month), custom day/week/month
//!     steps, and a plain "every day" calendar variant.
//! *   **Two scheduling modes**: the next instance either follows the actual
//!     completion (`recur_on_complete`) or sticks to a fixed calendar that is
//!     pre-materialized up to a horizon.
//! *   **Fair rotation**: chores rotate round-robin through the household or a
//!     per-chore eligible pool, passing over members who have overdue chores.
//! *   **Overdue sweep**: a cancellable background task demotes late chores.
//! *   **Calendar expansion**: virtual future dates for display, never stored.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let store = Arc::new(InMemoryStore::new());
//! store.add_member(Member::new("Alice"))?;
//! store.add_member(Member::new("Bob"))?;
//!
//! let service = ChoreService::in_memory(store, Arc::new(SystemClock), EngineConfig::load()?);
//! service.backfill_series(service.seed_horizon())?;
//! service.overdue_sweeper(cancel.child_token()).spawn();
//!
//! let chore = service.create_task(
//!     Task::new("Take out bins")
//!         .due_on(today)
//!         .recurring(Recurrence::Weekly { interval: 1, days: vec!["monday".into()] }),
//! )?;
//! service.complete_task(chore.id, chore.assigned_to.unwrap())?;
//! ```
//!
//! Storage is pluggable through [`storage::TaskStore`],
//! [`storage::AssignmentStore`] and [`storage::MemberStore`];
//! [`storage::InMemoryStore`] implements all three.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod overdue;
pub mod recurrence;
pub mod rotation;
pub mod seeding;
pub mod service;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use error::{ChoreError, Result, StoreError};
pub use models::{Assignment, AssignmentStatus, CategoryId, Member, MemberId, Task, TaskId, TaskStatus};
pub use recurrence::{Recurrence, RecurrenceKind, RecurrenceUnit, VirtualOccurrence};
pub use service::{BackfillReport, ChoreService};
pub use storage::InMemoryStore;
