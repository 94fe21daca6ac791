//! Persistence seams consumed by the engine.
//!
//! The engine only needs a handful of reads and appends; the concrete
//! [`SqliteStore`](crate::sqlite::SqliteStore) adds the write-side CRUD used by
//! the schedule manager, inventory sync and the CLI.

use chrono::{DateTime, Utc};
use vmcron_core::types::{
    BlackoutWindow, GroupId, NewExecutionLog, Resource, ResourceId, Schedule, ScheduleId,
};

use crate::error::Result;

/// Schedule, blackout and execution-log access for the fire callback.
///
/// Every call is expected to be individually atomic; the engine never needs
/// a transaction spanning several calls.
pub trait EngineStore: Send + Sync {
    fn get_schedule(&self, id: ScheduleId) -> Result<Option<Schedule>>;

    fn list_enabled_schedules(&self) -> Result<Vec<Schedule>>;

    fn list_enabled_blackouts(&self) -> Result<Vec<BlackoutWindow>>;

    /// Update the advisory next-fire instant. Missing rows are ignored.
    fn set_next_run(&self, id: ScheduleId, next_run: Option<DateTime<Utc>>) -> Result<()>;

    /// Post-fire bookkeeping: last fired instant plus the new advisory next run.
    fn record_run(
        &self,
        id: ScheduleId,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Append one immutable audit row; returns its id.
    fn insert_execution_log(&self, entry: &NewExecutionLog) -> Result<i64>;
}

/// Read access to the locally cached cluster inventory.
pub trait ResourceCatalog: Send + Sync {
    fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>>;

    /// Lookup by cluster-assigned id.
    fn find_by_vmid(&self, vmid: u32) -> Result<Option<Resource>>;

    fn group_exists(&self, group_id: GroupId) -> Result<bool>;

    /// Current members in membership order. Unknown groups yield an empty list.
    fn get_group_members(&self, group_id: GroupId) -> Result<Vec<Resource>>;
}
