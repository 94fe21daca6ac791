use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, instrument, warn};
use vmcron_core::types::{
    BlackoutWindow, ExecutionLogEntry, ExecutionStatus, Group, GroupId, NewBlackoutWindow,
    NewExecutionLog, NewResource, NewSchedule, Resource, ResourceId, Schedule, ScheduleId,
    ScheduleUpdate, TargetRef, TaskHandle,
};

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::store::{EngineStore, ResourceCatalog};

const SCHEDULE_COLUMNS: &str = "id, name, target_type, target_id, action, cron_expression,
     enabled, created_at, updated_at, last_run, next_run";

const RESOURCE_COLUMNS: &str =
    "id, vmid, name, kind, node, status, maxmem, maxdisk, uptime, last_synced";

const BLACKOUT_COLUMNS: &str =
    "id, name, description, start_time, end_time, days_of_week, enabled";

const LOG_COLUMNS: &str = "id, schedule_id, vm_id, vmid, vm_name, action, status, executed_at,
     duration_ms, error_message, upid, skipped_reason";

/// Whether an inventory upsert created or refreshed a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added(ResourceId),
    Updated(ResourceId),
}

impl UpsertOutcome {
    pub fn id(self) -> ResourceId {
        match self {
            UpsertOutcome::Added(id) | UpsertOutcome::Updated(id) => id,
        }
    }
}

/// Filter for [`SqliteStore::list_execution_logs`].
#[derive(Debug, Clone, Copy)]
pub struct LogQuery {
    pub schedule_id: Option<ScheduleId>,
    pub status: Option<ExecutionStatus>,
    pub limit: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            schedule_id: None,
            status: None,
            limit: 100,
        }
    }
}

/// SQLite-backed store for schedules, inventory, blackouts and the execution log.
///
/// A single connection behind a `Mutex`. Every public method holds the lock
/// for exactly one logical operation.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied statement
        // behind, so the connection is still usable.
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Schedules
    // -----------------------------------------------------------------------

    #[instrument(skip(self, new), fields(name = %new.name, target = %new.target))]
    pub fn insert_schedule(&self, new: &NewSchedule) -> Result<Schedule> {
        let now = timestamp(Utc::now());
        let db = self.conn();
        db.execute(
            "INSERT INTO schedules
             (name, target_type, target_id, action, cron_expression, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                new.name,
                new.target.kind.as_str(),
                new.target.id,
                new.action.as_str(),
                new.cron_expression,
                new.enabled,
                now
            ],
        )?;
        let id = db.last_insert_rowid();
        debug!(id, "schedule inserted");
        fetch_schedule(&db, id)?.ok_or_else(|| SchedulerError::not_found("schedule", id))
    }

    /// Apply `update` on top of the stored row and bump `updated_at`.
    #[instrument(skip(self, update))]
    pub fn update_schedule(&self, id: ScheduleId, update: &ScheduleUpdate) -> Result<Schedule> {
        let db = self.conn();
        let mut current =
            fetch_schedule(&db, id)?.ok_or_else(|| SchedulerError::not_found("schedule", id))?;

        if let Some(name) = &update.name {
            current.name = name.clone();
        }
        if let Some(target) = update.target {
            current.target = target;
        }
        if let Some(action) = update.action {
            current.action = action;
        }
        if let Some(expr) = &update.cron_expression {
            current.cron_expression = expr.clone();
        }
        if let Some(enabled) = update.enabled {
            current.enabled = enabled;
        }

        db.execute(
            "UPDATE schedules
             SET name = ?1, target_type = ?2, target_id = ?3, action = ?4,
                 cron_expression = ?5, enabled = ?6, updated_at = ?7
             WHERE id = ?8",
            params![
                current.name,
                current.target.kind.as_str(),
                current.target.id,
                current.action.as_str(),
                current.cron_expression,
                current.enabled,
                timestamp(Utc::now()),
                id
            ],
        )?;
        fetch_schedule(&db, id)?.ok_or_else(|| SchedulerError::not_found("schedule", id))
    }

    #[instrument(skip(self))]
    pub fn set_schedule_enabled(&self, id: ScheduleId, enabled: bool) -> Result<Schedule> {
        self.update_schedule(
            id,
            &ScheduleUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
    }

    /// Delete a schedule. Its execution-log rows keep their content with a
    /// NULL `schedule_id`.
    #[instrument(skip(self))]
    pub fn delete_schedule(&self, id: ScheduleId) -> Result<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM schedules WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(SchedulerError::not_found("schedule", id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY id"
        ))?;
        let rows = stmt.query_map([], row_to_schedule)?;
        Ok(collect_rows("schedules", rows))
    }

    // -----------------------------------------------------------------------
    // Blackout windows
    // -----------------------------------------------------------------------

    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn insert_blackout(&self, new: &NewBlackoutWindow) -> Result<BlackoutWindow> {
        if let Some(days) = &new.days_of_week {
            if let Some(bad) = days.iter().find(|d| **d > 6) {
                return Err(SchedulerError::InvalidBlackout(format!(
                    "day {bad} out of range 0-6 (0 = Monday)"
                )));
            }
        }
        let days = new
            .days_of_week
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| SchedulerError::InvalidBlackout(e.to_string()))?;

        let db = self.conn();
        db.execute(
            "INSERT INTO blackout_windows
             (name, description, start_time, end_time, days_of_week, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.name,
                new.description,
                new.start_time.format("%H:%M:%S").to_string(),
                new.end_time.format("%H:%M:%S").to_string(),
                days,
                new.enabled,
                timestamp(Utc::now())
            ],
        )?;
        let id = db.last_insert_rowid();
        Ok(BlackoutWindow {
            id,
            name: new.name.clone(),
            description: new.description.clone(),
            start_time: new.start_time,
            end_time: new.end_time,
            days_of_week: new.days_of_week.clone(),
            enabled: new.enabled,
        })
    }

    #[instrument(skip(self))]
    pub fn list_blackouts(&self) -> Result<Vec<BlackoutWindow>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {BLACKOUT_COLUMNS} FROM blackout_windows ORDER BY id"
        ))?;
        let rows = stmt.query_map([], row_to_blackout)?;
        Ok(collect_rows("blackout_windows", rows))
    }

    #[instrument(skip(self))]
    pub fn delete_blackout(&self, id: i64) -> Result<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM blackout_windows WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(SchedulerError::not_found("blackout window", id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inventory
    // -----------------------------------------------------------------------

    /// Insert or refresh a resource, keyed by its cluster vmid.
    #[instrument(skip(self, new), fields(vmid = new.vmid))]
    pub fn upsert_resource(&self, new: &NewResource) -> Result<UpsertOutcome> {
        let now = timestamp(Utc::now());
        let db = self.conn();
        let existing: Option<ResourceId> = db
            .query_row(
                "SELECT id FROM vms WHERE vmid = ?1",
                params![new.vmid],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                db.execute(
                    "UPDATE vms
                     SET name = ?1, kind = ?2, node = ?3, status = ?4, maxmem = ?5,
                         maxdisk = ?6, uptime = ?7, last_synced = ?8
                     WHERE id = ?9",
                    params![
                        new.name,
                        new.kind.as_str(),
                        new.node,
                        new.status,
                        new.maxmem,
                        new.maxdisk,
                        new.uptime,
                        now,
                        id
                    ],
                )?;
                Ok(UpsertOutcome::Updated(id))
            }
            None => {
                db.execute(
                    "INSERT INTO vms
                     (vmid, name, kind, node, status, maxmem, maxdisk, uptime, last_synced)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        new.vmid,
                        new.name,
                        new.kind.as_str(),
                        new.node,
                        new.status,
                        new.maxmem,
                        new.maxdisk,
                        new.uptime,
                        now
                    ],
                )?;
                Ok(UpsertOutcome::Added(db.last_insert_rowid()))
            }
        }
    }

    #[instrument(skip(self))]
    pub fn list_resources(&self) -> Result<Vec<Resource>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM vms ORDER BY vmid"
        ))?;
        let rows = stmt.query_map([], row_to_resource)?;
        Ok(collect_rows("vms", rows))
    }

    /// Remove a resource. Group memberships cascade; log rows keep their copy.
    #[instrument(skip(self))]
    pub fn delete_resource(&self, id: ResourceId) -> Result<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM vms WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(SchedulerError::not_found("resource", id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    #[instrument(skip(self, description))]
    pub fn create_group(&self, name: &str, description: Option<&str>) -> Result<Group> {
        let now = Utc::now();
        let db = self.conn();
        db.execute(
            "INSERT INTO vm_groups (name, description, created_at) VALUES (?1, ?2, ?3)",
            params![name, description, timestamp(now)],
        )?;
        Ok(Group {
            id: db.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
        })
    }

    #[instrument(skip(self))]
    pub fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        self.conn()
            .query_row(
                "SELECT id, name, description, created_at FROM vm_groups WHERE id = ?1",
                params![id],
                row_to_group,
            )
            .optional()
            .map_err(corrupt("vm_groups"))
    }

    #[instrument(skip(self))]
    pub fn list_groups(&self) -> Result<Vec<Group>> {
        let db = self.conn();
        let mut stmt =
            db.prepare("SELECT id, name, description, created_at FROM vm_groups ORDER BY name")?;
        let rows = stmt.query_map([], row_to_group)?;
        Ok(collect_rows("vm_groups", rows))
    }

    /// Delete a group and its memberships. Schedules targeting it stay and
    /// resolve to no targets until edited.
    #[instrument(skip(self))]
    pub fn delete_group(&self, id: GroupId) -> Result<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM vm_groups WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(SchedulerError::not_found("group", id));
        }
        Ok(())
    }

    /// Add a resource to a group. Adding an existing member is a no-op.
    #[instrument(skip(self))]
    pub fn add_group_member(&self, group_id: GroupId, resource_id: ResourceId) -> Result<()> {
        let db = self.conn();
        if !row_exists(&db, "vm_groups", group_id)? {
            return Err(SchedulerError::not_found("group", group_id));
        }
        if !row_exists(&db, "vms", resource_id)? {
            return Err(SchedulerError::not_found("resource", resource_id));
        }
        db.execute(
            "INSERT OR IGNORE INTO group_members (group_id, vm_id, added_at) VALUES (?1, ?2, ?3)",
            params![group_id, resource_id, timestamp(Utc::now())],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn remove_group_member(&self, group_id: GroupId, resource_id: ResourceId) -> Result<()> {
        let changed = self.conn().execute(
            "DELETE FROM group_members WHERE group_id = ?1 AND vm_id = ?2",
            params![group_id, resource_id],
        )?;
        if changed == 0 {
            return Err(SchedulerError::not_found("group member", resource_id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Execution log
    // -----------------------------------------------------------------------

    /// Most recent entries first.
    #[instrument(skip(self))]
    pub fn list_execution_logs(&self, query: LogQuery) -> Result<Vec<ExecutionLogEntry>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {LOG_COLUMNS} FROM execution_logs
             WHERE (?1 IS NULL OR schedule_id = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY executed_at DESC, id DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![
                query.schedule_id,
                query.status.map(|s| s.as_str()),
                query.limit as i64
            ],
            row_to_log,
        )?;
        Ok(collect_rows("execution_logs", rows))
    }
}

impl EngineStore for SqliteStore {
    #[instrument(skip(self))]
    fn get_schedule(&self, id: ScheduleId) -> Result<Option<Schedule>> {
        fetch_schedule(&self.conn(), id)
    }

    #[instrument(skip(self))]
    fn list_enabled_schedules(&self) -> Result<Vec<Schedule>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE enabled = 1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([], row_to_schedule)?;
        Ok(collect_rows("schedules", rows))
    }

    #[instrument(skip(self))]
    fn list_enabled_blackouts(&self) -> Result<Vec<BlackoutWindow>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!(
            "SELECT {BLACKOUT_COLUMNS} FROM blackout_windows WHERE enabled = 1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([], row_to_blackout)?;
        Ok(collect_rows("blackout_windows", rows))
    }

    #[instrument(skip(self))]
    fn set_next_run(&self, id: ScheduleId, next_run: Option<DateTime<Utc>>) -> Result<()> {
        self.conn().execute(
            "UPDATE schedules SET next_run = ?1 WHERE id = ?2",
            params![next_run.map(timestamp), id],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn record_run(
        &self,
        id: ScheduleId,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE schedules SET last_run = ?1, next_run = ?2 WHERE id = ?3",
            params![timestamp(last_run), next_run.map(timestamp), id],
        )?;
        if changed == 0 {
            return Err(SchedulerError::not_found("schedule", id));
        }
        Ok(())
    }

    #[instrument(skip(self, entry), fields(schedule_id = ?entry.schedule_id, status = %entry.status))]
    fn insert_execution_log(&self, entry: &NewExecutionLog) -> Result<i64> {
        let db = self.conn();
        db.execute(
            "INSERT INTO execution_logs
             (schedule_id, vm_id, vmid, vm_name, action, status, executed_at,
              duration_ms, error_message, upid, skipped_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.schedule_id,
                entry.resource_id,
                entry.vmid,
                entry.resource_name,
                entry.action.as_str(),
                entry.status.as_str(),
                timestamp(entry.executed_at),
                entry.duration_ms.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)),
                entry.error_message,
                entry.task_handle.as_ref().map(TaskHandle::as_str),
                entry.skipped_reason
            ],
        )?;
        Ok(db.last_insert_rowid())
    }
}

impl ResourceCatalog for SqliteStore {
    #[instrument(skip(self))]
    fn get_resource(&self, id: ResourceId) -> Result<Option<Resource>> {
        self.conn()
            .query_row(
                &format!("SELECT {RESOURCE_COLUMNS} FROM vms WHERE id = ?1"),
                params![id],
                row_to_resource,
            )
            .optional()
            .map_err(corrupt("vms"))
    }

    #[instrument(skip(self))]
    fn find_by_vmid(&self, vmid: u32) -> Result<Option<Resource>> {
        self.conn()
            .query_row(
                &format!("SELECT {RESOURCE_COLUMNS} FROM vms WHERE vmid = ?1"),
                params![vmid],
                row_to_resource,
            )
            .optional()
            .map_err(corrupt("vms"))
    }

    #[instrument(skip(self))]
    fn group_exists(&self, group_id: GroupId) -> Result<bool> {
        row_exists(&self.conn(), "vm_groups", group_id)
    }

    #[instrument(skip(self))]
    fn get_group_members(&self, group_id: GroupId) -> Result<Vec<Resource>> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT v.id, v.vmid, v.name, v.kind, v.node, v.status, v.maxmem, v.maxdisk,
                    v.uptime, v.last_synced
             FROM group_members gm
             JOIN vms v ON v.id = gm.vm_id
             WHERE gm.group_id = ?1
             ORDER BY gm.id",
        )?;
        let rows = stmt.query_map(params![group_id], row_to_resource)?;
        Ok(collect_rows("vms", rows))
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn fetch_schedule(db: &Connection, id: ScheduleId) -> Result<Option<Schedule>> {
    db.query_row(
        &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
        params![id],
        row_to_schedule,
    )
    .optional()
    .map_err(corrupt("schedules"))
}

fn row_exists(db: &Connection, table: &str, id: i64) -> Result<bool> {
    let found: Option<i64> = db
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1"),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Keep decodable rows, warn about the rest.
fn collect_rows<T>(
    table: &'static str,
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Vec<T> {
    rows.filter_map(|r| match r {
        Ok(item) => Some(item),
        Err(e) => {
            warn!(table, error = %e, "skipping undecodable row");
            None
        }
    })
    .collect()
}

/// Map decode failures on `table` to [`SchedulerError::CorruptRow`].
fn corrupt(table: &'static str) -> impl Fn(rusqlite::Error) -> SchedulerError {
    move |e| match e {
        rusqlite::Error::FromSqlConversionFailure(_, _, reason) => SchedulerError::CorruptRow {
            table,
            reason: reason.to_string(),
        },
        other => SchedulerError::Database(other),
    }
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion(idx, e))
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn parse_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion(idx, e))
    })
    .transpose()
}

fn parse_time_of_day(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
        .map_err(|e| conversion(idx, e))
}

fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: row.get(0)?,
        name: row.get(1)?,
        target: TargetRef {
            kind: parse_text(row, 2)?,
            id: row.get(3)?,
        },
        action: parse_text(row, 4)?,
        cron_expression: row.get(5)?,
        enabled: row.get(6)?,
        created_at: parse_ts(row, 7)?,
        updated_at: parse_ts(row, 8)?,
        last_run: parse_opt_ts(row, 9)?,
        next_run: parse_opt_ts(row, 10)?,
    })
}

fn row_to_resource(row: &Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: row.get(0)?,
        vmid: row.get(1)?,
        name: row.get(2)?,
        kind: parse_text(row, 3)?,
        node: row.get(4)?,
        status: row.get(5)?,
        maxmem: row.get(6)?,
        maxdisk: row.get(7)?,
        uptime: row.get(8)?,
        last_synced: parse_opt_ts(row, 9)?,
    })
}

fn row_to_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_ts(row, 3)?,
    })
}

fn row_to_blackout(row: &Row<'_>) -> rusqlite::Result<BlackoutWindow> {
    let days: Option<String> = row.get(5)?;
    let days_of_week = days
        .map(|raw| serde_json::from_str::<Vec<u8>>(&raw).map_err(|e| conversion(5, e)))
        .transpose()?;
    Ok(BlackoutWindow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        start_time: parse_time_of_day(row, 3)?,
        end_time: parse_time_of_day(row, 4)?,
        days_of_week,
        enabled: row.get(6)?,
    })
}

fn row_to_log(row: &Row<'_>) -> rusqlite::Result<ExecutionLogEntry> {
    let duration: Option<i64> = row.get(8)?;
    let upid: Option<String> = row.get(10)?;
    Ok(ExecutionLogEntry {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        resource_id: row.get(2)?,
        vmid: row.get(3)?,
        resource_name: row.get(4)?,
        action: parse_text(row, 5)?,
        status: parse_text(row, 6)?,
        executed_at: parse_ts(row, 7)?,
        duration_ms: duration.map(|ms| ms.max(0) as u64),
        error_message: row.get(9)?,
        task_handle: upid.map(TaskHandle),
        skipped_reason: row.get(11)?,
    })
}
