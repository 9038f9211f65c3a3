//! # Device Identity
//!
//! The identity a device proves on every authenticated control-plane call.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Device Identity Lifecycle                          │
//! │                                                                         │
//! │   project_id ───────────────┐  (process config, immutable)             │
//! │                             │                                           │
//! │   RegisterDevice(token) ──► RegisteredDevice { deviceId, accessKey }   │
//! │                             │                                           │
//! │                             ▼                                           │
//! │                   persisted once under <state>/<project>/              │
//! │                             │                                           │
//! │                             ▼                                           │
//! │                  DeviceIdentity (Arc, never mutated)                   │
//! │                  shared by the client and the sync loops               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

// =============================================================================
// Device Identity
// =============================================================================

/// Project, device and access key of a registered device.
///
/// Constructed once after registration and shared read-only afterwards.
/// The `Debug` output never contains the access key.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    project_id: String,
    device_id: String,
    access_key: String,
}

impl DeviceIdentity {
    /// Creates a validated identity.
    pub fn new(
        project_id: impl Into<String>,
        device_id: impl Into<String>,
        access_key: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let project_id = project_id.into();
        let device_id = device_id.into();
        let access_key = access_key.into();

        validate_project_id(&project_id)?;
        validate_token("device_id", &device_id)?;
        validate_token("access_key", &access_key)?;

        Ok(DeviceIdentity {
            project_id,
            device_id,
            access_key,
        })
    }

    /// Returns the project identifier.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Returns the device identifier assigned by the control plane.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the device access key.
    pub fn access_key(&self) -> &str {
        &self.access_key
    }
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("project_id", &self.project_id)
            .field("device_id", &self.device_id)
            .field("access_key", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Registration Response
// =============================================================================

/// Control-plane answer to a device registration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredDevice {
    /// Identifier assigned to the new device.
    pub device_id: String,

    /// Secret the device authenticates with from now on.
    pub device_access_key_value: String,
}

impl RegisteredDevice {
    /// Binds the response to a project, validating both values.
    pub fn into_identity(self, project_id: &str) -> Result<DeviceIdentity, ValidationError> {
        DeviceIdentity::new(project_id, self.device_id, self.device_access_key_value)
    }
}

impl fmt::Debug for RegisteredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredDevice")
            .field("device_id", &self.device_id)
            .field("device_access_key_value", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Checks that a project identifier can name a state directory.
pub fn validate_project_id(project_id: &str) -> Result<(), ValidationError> {
    validate_token("project_id", project_id)?;

    if project_id == "." || project_id == ".." || project_id.contains(['/', '\\']) {
        return Err(ValidationError::InvalidPathSegment {
            field: "project_id",
            value: project_id.to_string(),
        });
    }

    Ok(())
}

fn validate_token(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidCharacters { field });
    }
    Ok(())
}
