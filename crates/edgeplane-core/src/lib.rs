//! # edgeplane-core: Pure Types for the edgeplane Device Agent
//!
//! This crate holds the data model shared by the agent runtime and its
//! control-plane client. Everything here is plain data plus pure functions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      edgeplane Agent Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/agentd (daemon)                         │   │
//! │  │      config ──► tracing ──► Agent::run_until(ctrl-c)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    edgeplane-agent                              │   │
//! │  │   registration ── credentials ── sync loops ── HTTP client      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ edgeplane-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐   ┌────────────┐   ┌────────────┐             │   │
//! │  │   │  identity  │   │   bundle   │   │    info    │             │   │
//! │  │   │ DeviceId.. │   │  Bundle    │   │ DeviceInfo │             │   │
//! │  │   │ Registered │   │  Status    │   │ OsRelease  │             │   │
//! │  │   └────────────┘   └────────────┘   └────────────┘             │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO FILE SYSTEM                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`identity`] - Device identity and the registration response
//! - [`bundle`] - Desired application set and status report bodies
//! - [`info`] - Device info report and `os-release` parsing
//! - [`error`] - Validation errors
//!
//! ## Example Usage
//!
//! ```rust
//! use edgeplane_core::DeviceIdentity;
//!
//! let identity = DeviceIdentity::new("proj_1", "dev_42", "key-abc").unwrap();
//! assert_eq!(identity.device_id(), "dev_42");
//!
//! // The access key never shows up in debug output.
//! assert!(!format!("{:?}", identity).contains("key-abc"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bundle;
pub mod error;
pub mod identity;
pub mod info;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use bundle::{
    diff_applications, ApplicationSpec, Bundle, BundleDiff, SetDeviceApplicationStatusRequest,
    SetDeviceServiceStatusRequest,
};
pub use error::ValidationError;
pub use identity::{validate_project_id, DeviceIdentity, RegisteredDevice};
pub use info::{DeviceInfo, OsRelease};

// =============================================================================
// Crate-Level Constants
// =============================================================================

use std::time::Duration;

/// File holding the device access key, relative to the project state directory.
pub const ACCESS_KEY_FILENAME: &str = "access-key";

/// File holding the device identifier, relative to the project state directory.
pub const DEVICE_ID_FILENAME: &str = "device-id";

/// Version reported to the control plane.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cadence of the bundle fetch / supervisor update loop.
pub const SUPERVISION_INTERVAL: Duration = Duration::from_secs(1);

/// Cadence of the remote-access connector reconciliation loop.
pub const CONNECTOR_INTERVAL: Duration = Duration::from_secs(1);

/// Cadence of the device info report loop.
pub const INFO_INTERVAL: Duration = Duration::from_secs(60);
