//! # Agent Error Types
//!
//! Error types for the agent lifecycle, credential storage, control-plane
//! calls and the sync loops.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Agent Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Credentials   │  │     Registration        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  CredentialCheck│  │  RegistrationFailed     │ │
//! │  │  MissingProject │  │  CredentialWrite│  │  PartialRegistration    │ │
//! │  │  InvalidUrl     │  │  CredentialRead │  │  InvalidIdentity        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │           FATAL at startup: the agent never reaches steady state       │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Control Plane  │  │    Connector    │  │       Runtime           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Transport      │  │  WebSocket      │  │  CyclePanicked          │ │
//! │  │  Timeout        │  │                 │  │  ShuttingDown           │ │
//! │  │  Rejected       │  │                 │  │  Internal               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │           TRANSIENT in a sync loop: logged, cycle skipped              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use thiserror::Error;

use edgeplane_core::ValidationError;

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Agent error type covering every failure the lifecycle can see.
#[derive(Debug, Error)]
pub enum AgentError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid agent configuration.
    #[error("Invalid agent configuration: {0}")]
    InvalidConfig(String),

    /// Project id not configured.
    #[error("Project ID not configured. Set [device].project_id or EDGEPLANE_PROJECT_ID.")]
    MissingProjectId,

    /// Registration needed but no token configured.
    #[error("Device is not registered and no registration token is configured")]
    MissingRegistrationToken,

    /// Invalid controller URL.
    #[error("Invalid controller URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// An identity value is malformed.
    #[error("Invalid device identity: {0}")]
    InvalidIdentity(#[from] ValidationError),

    // =========================================================================
    // Credential Storage Errors
    // =========================================================================
    /// Checking for the access key failed for a reason other than absence.
    #[error("Failed to check for access key at {}", path.display())]
    CredentialCheck {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisting a credential failed.
    #[error("Failed to save credential {}", path.display())]
    CredentialWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading a persisted credential failed.
    #[error("Failed to read credential {}", path.display())]
    CredentialRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A credential file exists but holds nothing.
    #[error("Credential file {} is empty", path.display())]
    EmptyCredential { path: PathBuf },

    /// The access key is on disk but the device id is not.
    #[error("Access key is present but device ID {} is missing; refusing to re-register", missing.display())]
    PartialRegistration { missing: PathBuf },

    // =========================================================================
    // Registration Errors
    // =========================================================================
    /// The control plane refused or failed the registration call.
    #[error("Failed to register device: {0}")]
    RegistrationFailed(#[source] Box<AgentError>),

    // =========================================================================
    // Control Plane Errors
    // =========================================================================
    /// An authenticated call was made before credentials were injected.
    #[error("Control plane client has no device credentials yet")]
    NotAuthenticated,

    /// Request could not be sent or the response not received.
    #[error("Control plane request failed: {0}")]
    Transport(String),

    /// Request timed out.
    #[error("Control plane request timed out")]
    Timeout,

    /// Control plane answered with a non-success status.
    #[error("Control plane rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Response body could not be decoded.
    #[error("Failed to decode control plane response: {0}")]
    Decode(String),

    // =========================================================================
    // Connector Errors
    // =========================================================================
    /// Tunnel WebSocket failure.
    #[error("Tunnel WebSocket error: {0}")]
    WebSocket(String),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// A sync cycle panicked inside a collaborator.
    #[error("Sync cycle of {sync_loop} panicked")]
    CyclePanicked { sync_loop: &'static str },

    /// Agent is shutting down.
    #[error("Agent is shutting down")]
    ShuttingDown,

    /// Internal agent error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AgentError::Timeout
        } else if err.is_decode() {
            AgentError::Decode(err.to_string())
        } else {
            AgentError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for AgentError {
    fn from(err: url::ParseError) -> Self {
        AgentError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AgentError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AgentError::WebSocket(err.to_string())
    }
}

impl From<toml::de::Error> for AgentError {
    fn from(err: toml::de::Error) -> Self {
        AgentError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for AgentError {
    fn from(err: toml::ser::Error) -> Self {
        AgentError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl AgentError {
    /// Returns true if this error must abort startup.
    ///
    /// ## Fatal Errors
    /// - Configuration problems
    /// - Any credential storage failure
    /// - Registration failures and inconsistent on-disk state
    pub fn is_fatal(&self) -> bool {
        self.is_config_error()
            || matches!(
                self,
                AgentError::InvalidIdentity(_)
                    | AgentError::CredentialCheck { .. }
                    | AgentError::CredentialWrite { .. }
                    | AgentError::CredentialRead { .. }
                    | AgentError::EmptyCredential { .. }
                    | AgentError::PartialRegistration { .. }
                    | AgentError::RegistrationFailed(_)
            )
    }

    /// Returns true if a later attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Transport(_) | AgentError::Timeout | AgentError::WebSocket(_) => true,
            AgentError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AgentError::InvalidConfig(_)
                | AgentError::MissingProjectId
                | AgentError::MissingRegistrationToken
                | AgentError::InvalidUrl(_)
                | AgentError::ConfigLoadFailed(_)
                | AgentError::ConfigSaveFailed(_)
        )
    }
}
