use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};
use vmcron_core::config::SchedulerConfig;
use vmcron_core::types::TaskHandle;
use vmcron_core::{ControlPlane, TaskStatus};

/// Exit status Proxmox reports for a successful task.
const EXIT_OK: &str = "OK";

/// How long and how often to poll a remote task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub initial_interval: Duration,
    /// Backoff doubles the interval up to this cap.
    pub max_interval: Duration,
}

impl PollPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let initial = Duration::from_millis(config.task_poll_interval_ms.max(1));
        Self {
            timeout: Duration::from_secs(config.task_poll_timeout_secs),
            initial_interval: initial,
            max_interval: initial * 8,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// Final state of a polled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// Stopped with a non-OK exit status.
    Failed(String),
    TimedOut,
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }
}

/// Poll `handle` on `node` until it stops or `policy.timeout` elapses.
///
/// Transient poll errors are retried within the same budget. Only used to
/// report completion to interactive callers; dispatch success never waits on it.
pub async fn wait_for_task(
    control: &dyn ControlPlane,
    node: &str,
    handle: &TaskHandle,
    policy: PollPolicy,
) -> TaskOutcome {
    let deadline = Instant::now() + policy.timeout;
    let mut interval = policy.initial_interval;

    loop {
        match tokio::time::timeout_at(deadline, control.task_status(node, handle)).await {
            Err(_) => break,
            Ok(Ok(TaskStatus::Stopped { exit_status })) => {
                debug!(node, task = %handle, %exit_status, "task stopped");
                return if exit_status == EXIT_OK {
                    TaskOutcome::Completed
                } else {
                    TaskOutcome::Failed(exit_status)
                };
            }
            Ok(Ok(TaskStatus::Running)) => trace!(node, task = %handle, "task still running"),
            Ok(Err(e)) => warn!(node, task = %handle, error = %e, "task status poll failed"),
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
        interval = (interval * 2).min(policy.max_interval);
    }

    warn!(node, task = %handle, timeout_secs = policy.timeout.as_secs(), "task wait timed out");
    TaskOutcome::TimedOut
}
