use serde::Deserialize;
use vmcron_core::types::{NewResource, ResourceKind};
use vmcron_core::TaskStatus;

/// Every PVE API response wraps its payload in `{"data": ...}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// One entry of `GET /cluster/resources?type=vm`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GuestInfo {
    /// `qemu` or `lxc` for guests; other resource types are ignored.
    #[serde(rename = "type")]
    pub kind: String,
    pub vmid: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub node: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub maxmem: Option<i64>,
    #[serde(default)]
    pub maxdisk: Option<i64>,
    #[serde(default)]
    pub uptime: Option<i64>,
}

impl GuestInfo {
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        self.kind.parse().ok()
    }

    /// Inventory record for the local cache, or `None` for non-guest entries.
    pub fn into_new_resource(self) -> Option<NewResource> {
        let kind = self.resource_kind()?;
        let name = self
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("{kind}-{}", self.vmid));
        Some(NewResource {
            vmid: self.vmid,
            name,
            kind,
            node: self.node,
            status: self.status,
            maxmem: self.maxmem,
            maxdisk: self.maxdisk,
            uptime: self.uptime,
        })
    }
}

/// `GET /nodes/{node}/tasks/{upid}/status` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusPayload {
    pub status: String,
    #[serde(default)]
    pub exitstatus: Option<String>,
}

impl From<TaskStatusPayload> for TaskStatus {
    fn from(payload: TaskStatusPayload) -> Self {
        if payload.status == "stopped" {
            TaskStatus::Stopped {
                exit_status: payload.exitstatus.unwrap_or_default(),
            }
        } else {
            TaskStatus::Running
        }
    }
}
