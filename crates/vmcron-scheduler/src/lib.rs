//! `vmcron-scheduler`: cron-driven power-action engine with SQLite persistence.
//!
//! # Overview
//!
//! Each enabled schedule gets one tokio timer task in the
//! [`registry::TriggerRegistry`]. When a timer fires, [`fire::FireRunner`]
//! re-reads the schedule, consults the blackout windows, resolves the target
//! to resources and dispatches the action to all of them concurrently,
//! writing one execution-log row per target.
//!
//! # Modules
//!
//! | Module     | Responsibility                                           |
//! |------------|----------------------------------------------------------|
//! | `cron`     | Five-field cron parsing and next-fire computation        |
//! | `blackout` | Wrap-aware maintenance window membership                 |
//! | `resolve`  | Schedule target → resources                              |
//! | `dispatch` | Power action → one bounded control-plane call            |
//! | `journal`  | Append-only execution log writer                         |
//! | `fire`     | The fire callback                                        |
//! | `registry` | Timer lifecycle, reconciliation and periodic reload      |
//! | `manager`  | Validated schedule writes (persist, then reconcile)      |
//! | `actions`  | On-demand actions outside any schedule                   |
//! | `task`     | Polling a remote task to completion                      |
//! | `sqlite`   | `SqliteStore`, the rusqlite implementation of the stores |

pub mod actions;
pub mod blackout;
pub mod clock;
pub mod cron;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod fire;
pub mod journal;
pub mod manager;
pub mod registry;
pub mod resolve;
pub mod sqlite;
pub mod store;
pub mod task;

pub use actions::{Accepted, ManualActions, MemberResult};
pub use blackout::BlackoutCheck;
pub use clock::{Clock, MonotonicClock, SystemClock};
pub use cron::CronExpr;
pub use dispatch::{ActionDispatcher, DispatchReport};
pub use error::{Result, SchedulerError};
pub use fire::{FireOutcome, FireRunner};
pub use manager::ScheduleManager;
pub use registry::{ReloadReport, TriggerRegistry};
pub use sqlite::{LogQuery, SqliteStore, UpsertOutcome};
pub use store::{EngineStore, ResourceCatalog};
pub use task::{wait_for_task, PollPolicy, TaskOutcome};
