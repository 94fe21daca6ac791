use std::sync::Arc;

use tracing::{info, instrument, warn};
use vmcron_core::types::{
    NewSchedule, PowerAction, Schedule, ScheduleId, ScheduleUpdate, TargetKind, TargetRef,
};

use crate::cron;
use crate::error::{Result, SchedulerError};
use crate::registry::TriggerRegistry;
use crate::sqlite::SqliteStore;
use crate::store::{EngineStore, ResourceCatalog};

/// Write path for schedules: validate, persist, then reconcile the registry.
///
/// If the process dies between persisting and reconciling, the next
/// [`TriggerRegistry::reload_all`] repairs the timer set.
pub struct ScheduleManager {
    store: Arc<SqliteStore>,
    registry: Arc<TriggerRegistry>,
}

impl ScheduleManager {
    pub fn new(store: Arc<SqliteStore>, registry: Arc<TriggerRegistry>) -> Self {
        Self { store, registry }
    }

    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn create(&self, new: NewSchedule) -> Result<Schedule> {
        self.validate(new.target, new.action, &new.cron_expression)?;
        let schedule = self.store.insert_schedule(&new)?;
        info!(schedule_id = schedule.id, target = %schedule.target, "schedule created");
        self.reconcile(schedule)
    }

    #[instrument(skip(self, update))]
    pub fn update(&self, id: ScheduleId, update: ScheduleUpdate) -> Result<Schedule> {
        let current = self
            .store
            .get_schedule(id)?
            .ok_or_else(|| SchedulerError::not_found("schedule", id))?;
        self.validate(
            update.target.unwrap_or(current.target),
            update.action.unwrap_or(current.action),
            update
                .cron_expression
                .as_deref()
                .unwrap_or(&current.cron_expression),
        )?;
        let schedule = self.store.update_schedule(id, &update)?;
        info!(schedule_id = id, "schedule updated");
        self.reconcile(schedule)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: ScheduleId) -> Result<()> {
        self.store.delete_schedule(id)?;
        self.registry.reconcile_remove(id);
        info!(schedule_id = id, "schedule deleted");
        Ok(())
    }

    /// Flip `enabled` and arm or disarm the timer accordingly.
    #[instrument(skip(self))]
    pub fn toggle(&self, id: ScheduleId) -> Result<Schedule> {
        let current = self
            .store
            .get_schedule(id)?
            .ok_or_else(|| SchedulerError::not_found("schedule", id))?;
        let schedule = self.store.set_schedule_enabled(id, !current.enabled)?;
        info!(schedule_id = id, enabled = schedule.enabled, "schedule toggled");
        self.reconcile(schedule)
    }

    pub fn get(&self, id: ScheduleId) -> Result<Option<Schedule>> {
        self.store.get_schedule(id)
    }

    pub fn list(&self) -> Result<Vec<Schedule>> {
        self.store.list_schedules()
    }

    fn validate(&self, target: TargetRef, action: PowerAction, expression: &str) -> Result<()> {
        cron::validate(expression)?;

        match target.kind {
            TargetKind::Vm => {
                let resource = self.store.get_resource(target.id)?.ok_or_else(|| {
                    SchedulerError::InvalidTarget(format!("resource {} does not exist", target.id))
                })?;
                action
                    .check_kind(resource.kind)
                    .map_err(SchedulerError::Precondition)?;
            }
            TargetKind::Group => {
                if !self.store.group_exists(target.id)? {
                    return Err(SchedulerError::InvalidTarget(format!(
                        "group {} does not exist",
                        target.id
                    )));
                }
            }
        }
        Ok(())
    }

    fn reconcile(&self, mut schedule: Schedule) -> Result<Schedule> {
        if schedule.enabled {
            schedule.next_run = self
                .registry
                .reconcile_add(schedule.id, &schedule.cron_expression)?;
        } else {
            self.registry.reconcile_remove(schedule.id);
            if let Err(e) = self.store.set_next_run(schedule.id, None) {
                warn!(schedule_id = schedule.id, error = %e, "failed to clear next run");
            }
            schedule.next_run = None;
        }
        Ok(schedule)
    }
}
