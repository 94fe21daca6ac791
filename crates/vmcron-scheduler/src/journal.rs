use std::sync::Arc;

use tracing::{debug, error};
use vmcron_core::types::NewExecutionLog;

use crate::store::EngineStore;

/// Append-only writer for the execution log.
///
/// A failed write is logged and dropped: auditing must never turn a
/// completed action into a reported failure.
#[derive(Clone)]
pub struct ExecutionJournal {
    store: Arc<dyn EngineStore>,
}

impl ExecutionJournal {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    /// Write `entry` exactly once. Returns the row id when the write succeeded.
    pub fn record(&self, entry: NewExecutionLog) -> Option<i64> {
        match self.store.insert_execution_log(&entry) {
            Ok(id) => {
                debug!(
                    log_id = id,
                    schedule_id = ?entry.schedule_id,
                    vmid = ?entry.vmid,
                    status = %entry.status,
                    "execution logged"
                );
                Some(id)
            }
            Err(e) => {
                error!(
                    schedule_id = ?entry.schedule_id,
                    vmid = ?entry.vmid,
                    action = %entry.action,
                    status = %entry.status,
                    error = %e,
                    "failed to write execution log"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::{LogQuery, SqliteStore};
    use chrono::Utc;
    use vmcron_core::types::{ExecutionStatus, PowerAction};

    #[test]
    fn records_one_row_per_call() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let journal = ExecutionJournal::new(store.clone());
        let schedule = store
            .insert_schedule(&vmcron_core::types::NewSchedule {
                name: "s".to_string(),
                target: vmcron_core::types::TargetRef::group(1),
                action: PowerAction::Stop,
                cron_expression: "0 0 * * *".to_string(),
                enabled: true,
            })
            .unwrap();

        let id = journal.record(NewExecutionLog::skipped(
            schedule.id,
            PowerAction::Stop,
            Utc::now(),
            "freeze",
        ));
        assert!(id.is_some());

        let logs = store.list_execution_logs(LogQuery::default()).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, ExecutionStatus::Skipped);
    }

    /// Store whose every write fails, as when the database file is locked.
    struct ReadOnlyStore;

    impl EngineStore for ReadOnlyStore {
        fn get_schedule(&self, _id: i64) -> crate::Result<Option<vmcron_core::types::Schedule>> {
            Ok(None)
        }
        fn list_enabled_schedules(&self) -> crate::Result<Vec<vmcron_core::types::Schedule>> {
            Ok(Vec::new())
        }
        fn list_enabled_blackouts(&self) -> crate::Result<Vec<vmcron_core::types::BlackoutWindow>> {
            Ok(Vec::new())
        }
        fn set_next_run(&self, _id: i64, _next: Option<chrono::DateTime<Utc>>) -> crate::Result<()> {
            Ok(())
        }
        fn record_run(
            &self,
            _id: i64,
            _last: chrono::DateTime<Utc>,
            _next: Option<chrono::DateTime<Utc>>,
        ) -> crate::Result<()> {
            Ok(())
        }
        fn insert_execution_log(&self, _entry: &NewExecutionLog) -> crate::Result<i64> {
            Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_READONLY),
                Some("attempt to write a readonly database".to_string()),
            )
            .into())
        }
    }

    #[test]
    fn write_failures_are_swallowed() {
        let journal = ExecutionJournal::new(Arc::new(ReadOnlyStore));
        let id = journal.record(NewExecutionLog::skipped(
            7,
            PowerAction::Stop,
            Utc::now(),
            "freeze",
        ));
        assert!(id.is_none());
    }

    #[test]
    fn unknown_schedule_id_is_still_recorded() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let journal = ExecutionJournal::new(store.clone());
        let id = journal.record(NewExecutionLog::skipped(
            404,
            PowerAction::Stop,
            Utc::now(),
            "freeze",
        ));
        assert!(id.is_some());
        let logs = store.list_execution_logs(LogQuery::default()).unwrap();
        assert_eq!(logs[0].schedule_id, Some(404));
    }
}
