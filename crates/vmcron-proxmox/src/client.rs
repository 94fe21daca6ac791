use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use vmcron_core::config::ProxmoxConfig;
use vmcron_core::types::{NewResource, PowerAction, Resource, TaskHandle};
use vmcron_core::{ControlError, ControlPlane, TaskStatus};

use crate::types::{Envelope, GuestInfo, TaskStatusPayload};

/// Proxmox VE API client authenticated with an API token.
pub struct ProxmoxClient {
    client: reqwest::Client,
    base_url: String,
    auth_header: String,
}

impl ProxmoxClient {
    /// Client for `https://{host}:{port}/api2/json`.
    pub fn new(config: &ProxmoxConfig) -> Result<Self, ControlError> {
        Self::with_base_url(config, config.base_url())
    }

    /// Client against an explicit API root (up to and including `/api2/json`).
    pub fn with_base_url(
        config: &ProxmoxConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, ControlError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_ssl)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ControlError::Http(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(%base_url, user = %config.user, verify_ssl = config.verify_ssl, "proxmox client ready");
        Ok(Self {
            client,
            base_url,
            auth_header: auth_header(&config.user, &config.token_name, &config.token_value),
        })
    }

    /// Every VM and container in the cluster.
    pub async fn list_guests(&self) -> Result<Vec<GuestInfo>, ControlError> {
        let guests: Vec<GuestInfo> = self.get("/cluster/resources?type=vm").await?;
        let guests: Vec<GuestInfo> = guests
            .into_iter()
            .filter(|g| g.resource_kind().is_some())
            .collect();
        debug!(count = guests.len(), "listed cluster guests");
        Ok(guests)
    }

    /// [`list_guests`](Self::list_guests) mapped to inventory records.
    pub async fn list_resources(&self) -> Result<Vec<NewResource>, ControlError> {
        Ok(self
            .list_guests()
            .await?
            .into_iter()
            .filter_map(GuestInfo::into_new_resource)
            .collect())
    }

    async fn power(&self, resource: &Resource, command: &str) -> Result<TaskHandle, ControlError> {
        let path = format!(
            "/nodes/{}/{}/{}/status/{command}",
            resource.node,
            resource.kind.as_str(),
            resource.vmid
        );
        let upid: String = self.post(&path).await?;
        debug!(vmid = resource.vmid, node = %resource.node, command, %upid, "power command accepted");
        Ok(TaskHandle(upid))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ControlError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .map_err(map_send_error)?;
        unwrap_envelope(resp).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T, ControlError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .map_err(map_send_error)?;
        unwrap_envelope(resp).await
    }
}

#[async_trait]
impl ControlPlane for ProxmoxClient {
    fn name(&self) -> &str {
        "proxmox"
    }

    async fn start(&self, resource: &Resource) -> Result<TaskHandle, ControlError> {
        self.power(resource, "start").await
    }

    async fn stop(&self, resource: &Resource) -> Result<TaskHandle, ControlError> {
        self.power(resource, "stop").await
    }

    async fn reboot(&self, resource: &Resource) -> Result<TaskHandle, ControlError> {
        self.power(resource, "reboot").await
    }

    async fn shutdown(&self, resource: &Resource) -> Result<TaskHandle, ControlError> {
        self.power(resource, "shutdown").await
    }

    async fn reset(&self, resource: &Resource) -> Result<TaskHandle, ControlError> {
        PowerAction::Reset
            .check_kind(resource.kind)
            .map_err(ControlError::Precondition)?;
        self.power(resource, "reset").await
    }

    async fn task_status(
        &self,
        node: &str,
        handle: &TaskHandle,
    ) -> Result<TaskStatus, ControlError> {
        let payload: TaskStatusPayload = self
            .get(&format!("/nodes/{node}/tasks/{handle}/status"))
            .await?;
        Ok(payload.into())
    }
}

/// `Authorization` header value for PVE API tokens.
pub fn auth_header(user: &str, token_name: &str, token_value: &str) -> String {
    format!("PVEAPIToken={user}!{token_name}={token_value}")
}

fn map_send_error(e: reqwest::Error) -> ControlError {
    // Connection and timeout failures mean the cluster is unreachable rather
    // than that it rejected the request.
    if e.is_connect() || e.is_timeout() {
        ControlError::Unavailable(e.to_string())
    } else {
        ControlError::Http(e.to_string())
    }
}

async fn unwrap_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ControlError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = if text.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            text
        };
        warn!(status = status.as_u16(), body = %message, "Proxmox API error");
        return Err(ControlError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let envelope: Envelope<T> = resp
        .json()
        .await
        .map_err(|e| ControlError::Parse(e.to_string()))?;
    Ok(envelope.data)
}
