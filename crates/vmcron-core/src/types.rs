use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VmcronError;

/// Primary key of a `schedules` row.
pub type ScheduleId = i64;
/// Local primary key of a cached `vms` row (not the cluster vmid).
pub type ResourceId = i64;
/// Primary key of a `groups` row.
pub type GroupId = i64;

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Guest flavour as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Full virtual machine.
    Qemu,
    /// Lightweight container.
    Lxc,
}

impl ResourceKind {
    pub fn is_full_vm(self) -> bool {
        matches!(self, ResourceKind::Qemu)
    }

    /// Path segment used by the Proxmox REST API (`/nodes/{node}/{kind}/{vmid}`).
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Qemu => "qemu",
            ResourceKind::Lxc => "lxc",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = VmcronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qemu" => Ok(ResourceKind::Qemu),
            "lxc" => Ok(ResourceKind::Lxc),
            other => Err(VmcronError::UnknownVariant {
                kind: "resource kind",
                value: other.to_string(),
            }),
        }
    }
}

/// A VM or container from the locally cached cluster inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    /// Cluster-assigned numeric id.
    pub vmid: u32,
    pub name: String,
    pub kind: ResourceKind,
    /// Cluster node currently hosting the guest.
    pub node: String,
    /// Last-known power state (`running`, `stopped`, ...).
    pub status: Option<String>,
    pub maxmem: Option<i64>,
    pub maxdisk: Option<i64>,
    pub uptime: Option<i64>,
    pub last_synced: Option<DateTime<Utc>>,
}

/// Inventory record written by the cluster sync (upserted by `vmid`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResource {
    pub vmid: u32,
    pub name: String,
    pub kind: ResourceKind,
    pub node: String,
    pub status: Option<String>,
    pub maxmem: Option<i64>,
    pub maxdisk: Option<i64>,
    pub uptime: Option<i64>,
}

/// Named set of resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Power action that can be requested from the control plane.
///
/// Closed set: the dispatcher matches it exhaustively, so adding a variant
/// is a compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    Start,
    /// Hard stop.
    Stop,
    /// Guest reboot.
    Restart,
    /// Graceful ACPI / init shutdown.
    Shutdown,
    /// Hard reset; full VMs only.
    Reset,
}

impl PowerAction {
    pub const ALL: [PowerAction; 5] = [
        PowerAction::Start,
        PowerAction::Stop,
        PowerAction::Restart,
        PowerAction::Shutdown,
        PowerAction::Reset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PowerAction::Start => "start",
            PowerAction::Stop => "stop",
            PowerAction::Restart => "restart",
            PowerAction::Shutdown => "shutdown",
            PowerAction::Reset => "reset",
        }
    }

    /// Whether the action is only valid on [`ResourceKind::Qemu`] guests.
    pub fn requires_full_vm(self) -> bool {
        matches!(self, PowerAction::Reset)
    }

    /// Check the kind precondition for running `self` on a guest of `kind`.
    pub fn check_kind(self, kind: ResourceKind) -> Result<(), String> {
        if self.requires_full_vm() && !kind.is_full_vm() {
            return Err(format!("{self} is only available for qemu VMs, not {kind}"));
        }
        Ok(())
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerAction {
    type Err = VmcronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PowerAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| VmcronError::UnknownVariant {
                kind: "action",
                value: s.to_string(),
            })
    }
}

/// Opaque identifier of a remote task (a Proxmox UPID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(pub String);

impl TaskHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A single cached resource, by local id.
    Vm,
    /// Every member of a group at fire time.
    Group,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Vm => "vm",
            TargetKind::Group => "group",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = VmcronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vm" => Ok(TargetKind::Vm),
            "group" => Ok(TargetKind::Group),
            other => Err(VmcronError::UnknownVariant {
                kind: "target kind",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: i64,
}

impl TargetRef {
    pub fn vm(id: ResourceId) -> Self {
        Self {
            kind: TargetKind::Vm,
            id,
        }
    }

    pub fn group(id: GroupId) -> Self {
        Self {
            kind: TargetKind::Group,
            id,
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// A persisted schedule: run `action` on `target` whenever `cron_expression` fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub name: String,
    pub target: TargetRef,
    pub action: PowerAction,
    /// Five-field cron expression, evaluated in UTC.
    pub cron_expression: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Instant of the most recent fire that reached the dispatch stage.
    pub last_run: Option<DateTime<Utc>>,
    /// Advisory prediction for the UI. Never decides whether a timer exists.
    pub next_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSchedule {
    pub name: String,
    pub target: TargetRef,
    pub action: PowerAction,
    pub cron_expression: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub name: Option<String>,
    pub target: Option<TargetRef>,
    pub action: Option<PowerAction>,
    pub cron_expression: Option<String>,
    pub enabled: Option<bool>,
}

// ---------------------------------------------------------------------------
// Blackout windows
// ---------------------------------------------------------------------------

/// Maintenance period during which scheduled actions are suppressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackoutWindow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub start_time: NaiveTime,
    /// May be earlier than `start_time`, in which case the window spans midnight.
    pub end_time: NaiveTime,
    /// Weekdays the window applies to (0 = Monday … 6 = Sunday). `None` = every day.
    pub days_of_week: Option<Vec<u8>>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBlackoutWindow {
    pub name: String,
    pub description: Option<String>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub days_of_week: Option<Vec<u8>>,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Execution log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = VmcronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            "skipped" => Ok(ExecutionStatus::Skipped),
            other => Err(VmcronError::UnknownVariant {
                kind: "execution status",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable audit row. Resource identity is copied by value so history
/// survives deletion of the resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub id: i64,
    /// `None` for on-demand actions (and after the schedule is deleted).
    pub schedule_id: Option<ScheduleId>,
    pub resource_id: Option<ResourceId>,
    pub vmid: Option<u32>,
    pub resource_name: Option<String>,
    pub action: PowerAction,
    pub status: ExecutionStatus,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub task_handle: Option<TaskHandle>,
    pub skipped_reason: Option<String>,
}

/// Row to append to the execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExecutionLog {
    pub schedule_id: Option<ScheduleId>,
    pub resource_id: Option<ResourceId>,
    pub vmid: Option<u32>,
    pub resource_name: Option<String>,
    pub action: PowerAction,
    pub status: ExecutionStatus,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub task_handle: Option<TaskHandle>,
    pub skipped_reason: Option<String>,
}

impl NewExecutionLog {
    /// Entry for a fire suppressed by a blackout window; carries no resource.
    pub fn skipped(
        schedule_id: ScheduleId,
        action: PowerAction,
        at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            schedule_id: Some(schedule_id),
            resource_id: None,
            vmid: None,
            resource_name: None,
            action,
            status: ExecutionStatus::Skipped,
            executed_at: at,
            duration_ms: None,
            error_message: None,
            task_handle: None,
            skipped_reason: Some(reason.into()),
        }
    }

    /// Entry for one dispatch attempt against `resource`.
    pub fn attempt(
        schedule_id: Option<ScheduleId>,
        resource: &Resource,
        action: PowerAction,
        at: DateTime<Utc>,
        duration_ms: u64,
        outcome: Result<&TaskHandle, &str>,
    ) -> Self {
        let (status, task_handle, error_message) = match outcome {
            Ok(handle) => (ExecutionStatus::Success, Some(handle.clone()), None),
            Err(msg) => (ExecutionStatus::Failed, None, Some(msg.to_string())),
        };
        Self {
            schedule_id,
            resource_id: Some(resource.id),
            vmid: Some(resource.vmid),
            resource_name: Some(resource.name.clone()),
            action,
            status,
            executed_at: at,
            duration_ms: Some(duration_ms),
            error_message,
            task_handle,
            skipped_reason: None,
        }
    }
}

fn bool_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_action_round_trips_through_str() {
        for action in PowerAction::ALL {
            assert_eq!(action.as_str().parse::<PowerAction>().unwrap(), action);
        }
        assert!("reboot".parse::<PowerAction>().is_err());
    }

    #[test]
    fn reset_requires_full_vm() {
        assert!(PowerAction::Reset.check_kind(ResourceKind::Qemu).is_ok());
        let err = PowerAction::Reset.check_kind(ResourceKind::Lxc).unwrap_err();
        assert!(err.contains("only available for qemu"));
        assert!(PowerAction::Shutdown.check_kind(ResourceKind::Lxc).is_ok());
    }

    #[test]
    fn target_ref_display() {
        assert_eq!(TargetRef::group(7).to_string(), "group/7");
        assert_eq!(TargetRef::vm(3).to_string(), "vm/3");
    }

    #[test]
    fn new_schedule_defaults_to_enabled() {
        let json = r#"{"name":"nightly","target":{"kind":"group","id":1},
                       "action":"shutdown","cron_expression":"0 2 * * *"}"#;
        let s: NewSchedule = serde_json::from_str(json).unwrap();
        assert!(s.enabled);
        assert_eq!(s.action, PowerAction::Shutdown);
        assert_eq!(s.target, TargetRef::group(1));
    }
}
