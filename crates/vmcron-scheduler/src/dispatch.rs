use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, warn};
use vmcron_core::types::{NewExecutionLog, PowerAction, Resource, ScheduleId, TaskHandle};
use vmcron_core::{ControlError, ControlPlane};

/// Outcome of one dispatch attempt.
#[derive(Debug)]
pub struct DispatchReport {
    pub result: Result<TaskHandle, ControlError>,
    pub duration: Duration,
}

impl DispatchReport {
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Execution-log row for this attempt, started at `at`.
    pub fn log_entry(
        &self,
        schedule_id: Option<ScheduleId>,
        resource: &Resource,
        action: PowerAction,
        at: DateTime<Utc>,
    ) -> NewExecutionLog {
        let duration_ms = self.duration_ms();
        match &self.result {
            Ok(handle) => {
                NewExecutionLog::attempt(schedule_id, resource, action, at, duration_ms, Ok(handle))
            }
            Err(e) => NewExecutionLog::attempt(
                schedule_id,
                resource,
                action,
                at,
                duration_ms,
                Err(&e.to_string()),
            ),
        }
    }
}

/// Translates a [`PowerAction`] into one bounded control-plane call.
#[derive(Clone)]
pub struct ActionDispatcher {
    control: Arc<dyn ControlPlane>,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(control: Arc<dyn ControlPlane>, timeout: Duration) -> Self {
        Self { control, timeout }
    }

    pub fn control(&self) -> &Arc<dyn ControlPlane> {
        &self.control
    }

    /// Issue `action` against `resource`. Single attempt, no retry.
    ///
    /// Kind preconditions are checked locally; a violation is reported as a
    /// failure without contacting the control plane.
    pub async fn dispatch(&self, resource: &Resource, action: PowerAction) -> DispatchReport {
        let started = Instant::now();
        let result = self.call(resource, action).await;
        let duration = started.elapsed();

        match &result {
            Ok(handle) => debug!(
                vmid = resource.vmid,
                %action,
                task = %handle,
                elapsed_ms = duration.as_millis() as u64,
                "action accepted"
            ),
            Err(e) => warn!(
                vmid = resource.vmid,
                %action,
                code = e.code(),
                error = %e,
                "action failed"
            ),
        }

        DispatchReport { result, duration }
    }

    async fn call(
        &self,
        resource: &Resource,
        action: PowerAction,
    ) -> Result<TaskHandle, ControlError> {
        action
            .check_kind(resource.kind)
            .map_err(ControlError::Precondition)?;

        let control = self.control.as_ref();
        let request = async {
            match action {
                PowerAction::Start => control.start(resource).await,
                PowerAction::Stop => control.stop(resource).await,
                PowerAction::Restart => control.reboot(resource).await,
                PowerAction::Shutdown => control.shutdown(resource).await,
                PowerAction::Reset => control.reset(resource).await,
            }
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .unwrap_or_else(|_| {
                Err(ControlError::Timeout {
                    ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            })
    }
}
