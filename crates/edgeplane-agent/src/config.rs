//! # Agent Configuration
//!
//! Configuration management for the device agent.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     EDGEPLANE_PROJECT_ID=prj_123                                       │
//! │     EDGEPLANE_REGISTRATION_TOKEN=drt_456                               │
//! │     EDGEPLANE_STATE_DIR=/var/lib/edgeplane                             │
//! │     EDGEPLANE_CONTROLLER_URL=https://controller.example.com/api        │
//! │     EDGEPLANE_LOG_LEVEL=debug                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     $EDGEPLANE_CONFIG, or                                              │
//! │     ~/.config/edgeplane-agent/agent.toml (Linux)                       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # agent.toml
//! [device]
//! project_id = "prj_123"
//! registration_token = "drt_456"
//! state_dir = "/var/lib/edgeplane"
//!
//! [controller]
//! url = "https://controller.example.com/api"
//! request_timeout_secs = 30
//! connect_timeout_secs = 10
//!
//! [schedule]
//! supervision_interval_ms = 1000
//! connector_interval_ms = 1000
//! info_interval_secs = 60
//!
//! [log]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use edgeplane_core::{validate_project_id, CONNECTOR_INTERVAL, INFO_INTERVAL, SUPERVISION_INTERVAL};

use crate::error::{AgentError, AgentResult};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "EDGEPLANE_CONFIG";

// =============================================================================
// Device Configuration
// =============================================================================

/// Identity inputs supplied at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Project the device belongs to. Required.
    #[serde(default)]
    pub project_id: String,

    /// Shared token exchanged for a device access key on first start.
    /// Only needed while the device is unregistered.
    #[serde(default)]
    pub registration_token: String,

    /// Base directory for persisted credentials.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/edgeplane")
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            project_id: String::new(),
            registration_token: String::new(),
            state_dir: default_state_dir(),
        }
    }
}

// =============================================================================
// Controller Configuration
// =============================================================================

/// Where and how to reach the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Base URL of the control-plane API.
    #[serde(default = "default_controller_url")]
    pub url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_controller_url() -> String {
    "http://localhost:8080/api".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            url: default_controller_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ControllerConfig {
    /// Parses the controller URL.
    pub fn parsed_url(&self) -> AgentResult<Url> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(AgentError::InvalidUrl(format!(
                "Controller URL must use http:// or https://, got: {}://",
                other
            ))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// =============================================================================
// Schedule Configuration
// =============================================================================

/// Cadence of the three sync loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Bundle fetch interval (milliseconds).
    #[serde(default = "default_supervision_interval")]
    pub supervision_interval_ms: u64,

    /// Connector reconciliation interval (milliseconds).
    #[serde(default = "default_connector_interval")]
    pub connector_interval_ms: u64,

    /// Device info report interval (seconds).
    #[serde(default = "default_info_interval")]
    pub info_interval_secs: u64,
}

fn default_supervision_interval() -> u64 {
    SUPERVISION_INTERVAL.as_millis() as u64
}
fn default_connector_interval() -> u64 {
    CONNECTOR_INTERVAL.as_millis() as u64
}
fn default_info_interval() -> u64 {
    INFO_INTERVAL.as_secs()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            supervision_interval_ms: default_supervision_interval(),
            connector_interval_ms: default_connector_interval(),
            info_interval_secs: default_info_interval(),
        }
    }
}

impl ScheduleConfig {
    pub fn supervision_interval(&self) -> Duration {
        Duration::from_millis(self.supervision_interval_ms)
    }

    pub fn connector_interval(&self) -> Duration {
        Duration::from_millis(self.connector_interval_ms)
    }

    pub fn info_interval(&self) -> Duration {
        Duration::from_secs(self.info_interval_secs)
    }
}

// =============================================================================
// Log Configuration
// =============================================================================

/// Logging settings. `RUST_LOG` takes precedence when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive (e.g. "info", "edgeplane_agent=debug").
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
        }
    }
}

// =============================================================================
// Main Agent Configuration
// =============================================================================

/// Complete agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Identity inputs.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Control-plane endpoint.
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Loop cadences.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Logging.
    #[serde(default)]
    pub log: LogConfig,
}

impl AgentConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (agent.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> AgentResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading agent config from file");
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    AgentError::ConfigLoadFailed(format!("{}: {}", path.display(), e))
                })?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> AgentResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| AgentError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::ConfigSaveFailed(format!("{}: {}", parent.display(), e)))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| AgentError::ConfigSaveFailed(format!("{}: {}", path.display(), e)))?;

        info!(?path, "Agent config saved");
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// The registration token is not checked here; it is only required
    /// when the device turns out to be unregistered.
    pub fn validate(&self) -> AgentResult<()> {
        if self.device.project_id.is_empty() {
            return Err(AgentError::MissingProjectId);
        }
        validate_project_id(&self.device.project_id)
            .map_err(|e| AgentError::InvalidConfig(e.to_string()))?;

        if self.device.state_dir.as_os_str().is_empty() {
            return Err(AgentError::InvalidConfig("state_dir must not be empty".into()));
        }

        self.controller.parsed_url()?;

        if self.controller.request_timeout_secs == 0 || self.controller.connect_timeout_secs == 0 {
            return Err(AgentError::InvalidConfig(
                "controller timeouts must be greater than 0".into(),
            ));
        }

        if self.schedule.supervision_interval_ms == 0
            || self.schedule.connector_interval_ms == 0
            || self.schedule.info_interval_secs == 0
        {
            return Err(AgentError::InvalidConfig(
                "schedule intervals must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a key lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("EDGEPLANE_PROJECT_ID") {
            debug!(project_id = %id, "Overriding project ID from environment");
            self.device.project_id = id;
        }

        // Never logged.
        if let Some(token) = lookup("EDGEPLANE_REGISTRATION_TOKEN") {
            self.device.registration_token = token;
        }

        if let Some(dir) = lookup("EDGEPLANE_STATE_DIR") {
            debug!(state_dir = %dir, "Overriding state directory from environment");
            self.device.state_dir = PathBuf::from(dir);
        }

        if let Some(url) = lookup("EDGEPLANE_CONTROLLER_URL") {
            debug!(url = %url, "Overriding controller URL from environment");
            self.controller.url = url;
        }

        if let Some(level) = lookup("EDGEPLANE_LOG_LEVEL") {
            self.log.level = level;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("com", "edgeplane", "edgeplane-agent")
            .map(|dirs| dirs.config_dir().join("agent.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the project ID.
    pub fn project_id(&self) -> &str {
        &self.device.project_id
    }

    /// Returns the registration token, if one is configured.
    pub fn registration_token(&self) -> Option<&str> {
        let token = self.device.registration_token.trim();
        (!token.is_empty()).then_some(token)
    }

    /// Returns the credential base directory.
    pub fn state_dir(&self) -> &std::path::Path {
        &self.device.state_dir
    }
}
