use std::sync::Arc;

use futures_util::future::join_all;
use tracing::info;
use vmcron_core::types::{GroupId, PowerAction, Resource, TaskHandle};
use vmcron_core::ControlError;

use crate::clock::Clock;
use crate::dispatch::ActionDispatcher;
use crate::error::{Result, SchedulerError};
use crate::journal::ExecutionJournal;
use crate::store::{EngineStore, ResourceCatalog};

/// An on-demand action the control plane accepted.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub resource: Resource,
    pub handle: TaskHandle,
}

/// Per-member result of an on-demand group action.
#[derive(Debug)]
pub struct MemberResult {
    pub resource: Resource,
    pub result: std::result::Result<TaskHandle, ControlError>,
}

/// Immediate, operator-initiated power actions.
///
/// Not subject to blackout windows. Every attempt is logged without a
/// schedule reference.
pub struct ManualActions {
    catalog: Arc<dyn ResourceCatalog>,
    dispatcher: ActionDispatcher,
    journal: ExecutionJournal,
    clock: Arc<dyn Clock>,
}

impl ManualActions {
    pub fn new(
        store: Arc<dyn EngineStore>,
        catalog: Arc<dyn ResourceCatalog>,
        dispatcher: ActionDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            dispatcher,
            journal: ExecutionJournal::new(store),
            clock,
        }
    }

    /// Run `action` on the resource with cluster id `vmid`.
    pub async fn run_on_resource(&self, vmid: u32, action: PowerAction) -> Result<Accepted> {
        let resource = self
            .catalog
            .find_by_vmid(vmid)?
            .ok_or_else(|| SchedulerError::not_found("resource", i64::from(vmid)))?;

        let result = self.attempt(&resource, action).await;
        info!(vmid, %action, ok = result.is_ok(), "manual action");
        match result {
            Ok(handle) => Ok(Accepted { resource, handle }),
            Err(ControlError::Precondition(message)) => Err(SchedulerError::Precondition(message)),
            Err(e) => Err(SchedulerError::Dispatch(e)),
        }
    }

    /// Run `action` on every current member of `group_id`, concurrently.
    pub async fn run_on_group(
        &self,
        group_id: GroupId,
        action: PowerAction,
    ) -> Result<Vec<MemberResult>> {
        if !self.catalog.group_exists(group_id)? {
            return Err(SchedulerError::not_found("group", group_id));
        }
        let members = self.catalog.get_group_members(group_id)?;
        if members.is_empty() {
            return Err(SchedulerError::InvalidTarget(format!(
                "group {group_id} has no members"
            )));
        }

        let results = join_all(members.into_iter().map(|resource| async move {
            let result = self.attempt(&resource, action).await;
            MemberResult { resource, result }
        }))
        .await;

        let succeeded = results.iter().filter(|r| r.result.is_ok()).count();
        info!(
            group_id,
            %action,
            succeeded,
            failed = results.len() - succeeded,
            "manual group action"
        );
        Ok(results)
    }

    async fn attempt(
        &self,
        resource: &Resource,
        action: PowerAction,
    ) -> std::result::Result<TaskHandle, ControlError> {
        let at = self.clock.now();
        let report = self.dispatcher.dispatch(resource, action).await;
        self.journal.record(report.log_entry(None, resource, action, at));
        report.result
    }
}
