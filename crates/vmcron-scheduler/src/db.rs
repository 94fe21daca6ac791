use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Idempotent. Timestamps are RFC 3339 text, times of day `HH:MM:SS`, and
/// `blackout_windows.days_of_week` a JSON array (0 = Monday) or NULL.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS vms (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            vmid        INTEGER NOT NULL UNIQUE,  -- cluster-assigned id
            name        TEXT    NOT NULL,
            kind        TEXT    NOT NULL CHECK (kind IN ('qemu', 'lxc')),
            node        TEXT    NOT NULL,
            status      TEXT,
            maxmem      INTEGER,
            maxdisk     INTEGER,
            uptime      INTEGER,
            last_synced TEXT
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_vms_node ON vms (node);

        CREATE TABLE IF NOT EXISTS vm_groups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT    NOT NULL UNIQUE,
            description TEXT,
            created_at  TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS group_members (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id    INTEGER NOT NULL REFERENCES vm_groups (id) ON DELETE CASCADE,
            vm_id       INTEGER NOT NULL REFERENCES vms (id) ON DELETE CASCADE,
            added_at    TEXT    NOT NULL,
            UNIQUE (group_id, vm_id)
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_group_members_group ON group_members (group_id);

        CREATE TABLE IF NOT EXISTS schedules (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT    NOT NULL,
            target_type     TEXT    NOT NULL CHECK (target_type IN ('vm', 'group')),
            target_id       INTEGER NOT NULL,
            action          TEXT    NOT NULL,
            cron_expression TEXT    NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL,
            last_run        TEXT,
            next_run        TEXT    -- advisory only
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_schedules_enabled ON schedules (enabled);

        CREATE TABLE IF NOT EXISTS blackout_windows (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            name         TEXT    NOT NULL,
            description  TEXT,
            start_time   TEXT    NOT NULL,
            end_time     TEXT    NOT NULL,
            days_of_week TEXT,
            enabled      INTEGER NOT NULL DEFAULT 1,
            created_at   TEXT    NOT NULL
        ) STRICT;

        -- Append-only. Ids are recorded as plain values, not foreign keys, so a
        -- fire still logs after its schedule or VM was deleted mid-flight.
        CREATE TABLE IF NOT EXISTS execution_logs (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            schedule_id    INTEGER,
            vm_id          INTEGER,
            vmid           INTEGER,
            vm_name        TEXT,
            action         TEXT    NOT NULL,
            status         TEXT    NOT NULL CHECK (status IN ('success', 'failed', 'skipped')),
            executed_at    TEXT    NOT NULL,
            duration_ms    INTEGER,
            error_message  TEXT,
            upid           TEXT,
            skipped_reason TEXT
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_execution_logs_schedule ON execution_logs (schedule_id);
        CREATE INDEX IF NOT EXISTS idx_execution_logs_executed ON execution_logs (executed_at);
        ",
    )?;
    Ok(())
}
