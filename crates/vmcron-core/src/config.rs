use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROXMOX_PORT: u16 = 8006;
pub const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TASK_POLL_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_TASK_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 5;

/// Environment prefix; nested keys use `__`, e.g. `VMCRON_PROXMOX__TOKEN_VALUE`.
pub const ENV_PREFIX: &str = "VMCRON_";

/// Top-level config (vmcron.toml + VMCRON_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmcronConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub proxmox: ProxmoxConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Proxmox VE API-token credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxmoxConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_proxmox_port")]
    pub port: u16,
    /// API user including realm, e.g. `root@pam`.
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub token_name: String,
    #[serde(default)]
    pub token_value: String,
    /// Self-signed certificates are the norm on PVE, so this defaults to false.
    #[serde(default)]
    pub verify_ssl: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProxmoxConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PROXMOX_PORT,
            user: String::new(),
            token_name: String::new(),
            token_value: String::new(),
            verify_ssl: false,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProxmoxConfig {
    /// True when every credential needed to reach the API is present.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
            && !self.user.is_empty()
            && !self.token_name.is_empty()
            && !self.token_value.is_empty()
    }

    pub fn base_url(&self) -> String {
        format!("https://{}:{}/api2/json", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cadence of the full registry reload that repairs drift from storage.
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,
    /// Upper bound for a single remote dispatch call.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    #[serde(default = "default_task_poll_timeout_secs")]
    pub task_poll_timeout_secs: u64,
    #[serde(default = "default_task_poll_interval_ms")]
    pub task_poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reload_interval_secs: DEFAULT_RELOAD_INTERVAL_SECS,
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            task_poll_timeout_secs: DEFAULT_TASK_POLL_TIMEOUT_SECS,
            task_poll_interval_ms: DEFAULT_TASK_POLL_INTERVAL_MS,
        }
    }
}

/// Periodic inventory refresh from the cluster into the local `vms` cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_sync_interval_minutes")]
    pub interval_minutes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_proxmox_port() -> u16 {
    DEFAULT_PROXMOX_PORT
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_reload_interval_secs() -> u64 {
    DEFAULT_RELOAD_INTERVAL_SECS
}
fn default_dispatch_timeout_secs() -> u64 {
    DEFAULT_DISPATCH_TIMEOUT_SECS
}
fn default_task_poll_timeout_secs() -> u64 {
    DEFAULT_TASK_POLL_TIMEOUT_SECS
}
fn default_task_poll_interval_ms() -> u64 {
    DEFAULT_TASK_POLL_INTERVAL_MS
}
fn default_sync_interval_minutes() -> u64 {
    DEFAULT_SYNC_INTERVAL_MINUTES
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vmcron/vmcron.db", home)
}

impl VmcronConfig {
    /// Load config from a TOML file with VMCRON_* env var overrides.
    ///
    /// Path resolution: explicit argument, then `VMCRON_CONFIG`, then
    /// `~/.vmcron/vmcron.toml`. A missing file yields defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("VMCRON_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::VmcronError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vmcron/vmcron.toml", home)
}
