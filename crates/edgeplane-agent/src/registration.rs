//! # Device Registration
//!
//! Exactly-once registration and credential injection.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Registration State Machine                          │
//! │                                                                         │
//! │  ┌──────────────┐  access-key absent  ┌─────────────┐                   │
//! │  │ Unregistered │ ──────────────────► │ Registering │                   │
//! │  └──────┬───────┘                     └──────┬──────┘                   │
//! │         │ ▲                                  │ RegisterDevice(token)    │
//! │         │ └──────────── failure ─────────────┤ persist device-id        │
//! │         │                                    │ persist access-key       │
//! │         │ access-key present                 ▼                          │
//! │         │                             ┌─────────────┐                   │
//! │         └───────────────────────────► │ Registered  │ (terminal)        │
//! │                                       └─────────────┘                   │
//! │                                                                         │
//! │  Registered: read both files, build DeviceIdentity, inject into client │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## On-Disk States
//! | access-key | device-id | Outcome                                      |
//! |------------|-----------|----------------------------------------------|
//! | absent     | absent    | register                                     |
//! | absent     | present   | register (stale device-id is overwritten)    |
//! | present    | present   | load, never re-register                      |
//! | present    | absent    | fatal [`AgentError::PartialRegistration`]    |
//!
//! The device id is always written before the access key, so the last row
//! can only come from outside interference.

use std::sync::Arc;
use tracing::{debug, info, warn};

use edgeplane_core::{DeviceIdentity, ACCESS_KEY_FILENAME, DEVICE_ID_FILENAME};

use crate::client::Registrar;
use crate::credentials::CredentialStore;
use crate::error::{AgentError, AgentResult};

/// Registration progress of this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
}

/// Drives a device from whatever is on disk to an authenticated client.
pub struct Registration {
    store: CredentialStore,
    registrar: Arc<dyn Registrar>,
    project_id: String,
    registration_token: Option<String>,
    state: RegistrationState,
}

impl Registration {
    pub fn new(
        store: CredentialStore,
        registrar: Arc<dyn Registrar>,
        project_id: impl Into<String>,
        registration_token: Option<String>,
    ) -> Self {
        Registration {
            store,
            registrar,
            project_id: project_id.into(),
            registration_token,
            state: RegistrationState::Unregistered,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// Registers if needed, then loads the credentials and injects them
    /// into the registrar.
    ///
    /// Every error is fatal to startup. A failed registration writes
    /// nothing and leaves the state at `Unregistered`.
    pub async fn ensure_registered(&mut self) -> AgentResult<Arc<DeviceIdentity>> {
        if !self.check(ACCESS_KEY_FILENAME)? {
            self.register().await?;
        } else if !self.check(DEVICE_ID_FILENAME)? {
            return Err(AgentError::PartialRegistration {
                missing: self.store.locate(&[DEVICE_ID_FILENAME]),
            });
        } else {
            debug!(root = %self.store.root().display(), "Existing credentials found");
        }

        self.state = RegistrationState::Registered;

        let device_id = self.store.read_credential(DEVICE_ID_FILENAME)?;
        let access_key = self.store.read_credential(ACCESS_KEY_FILENAME)?;
        let identity = Arc::new(DeviceIdentity::new(&self.project_id, device_id, access_key)?);

        self.registrar.authenticate(identity.clone()).await;

        info!(
            project_id = %identity.project_id(),
            device_id = %identity.device_id(),
            "Device credentials loaded"
        );
        Ok(identity)
    }

    async fn register(&mut self) -> AgentResult<()> {
        let token = self
            .registration_token
            .clone()
            .ok_or(AgentError::MissingRegistrationToken)?;

        if self.store.exists(&[DEVICE_ID_FILENAME]) {
            warn!(
                path = %self.store.locate(&[DEVICE_ID_FILENAME]).display(),
                "Found device ID without access key, registering again"
            );
        }

        self.state = RegistrationState::Registering;
        info!(project_id = %self.project_id, "Registering device");

        let outcome = self.request_and_persist(&token).await;
        if outcome.is_err() {
            self.state = RegistrationState::Unregistered;
        }
        outcome
    }

    async fn request_and_persist(&self, token: &str) -> AgentResult<()> {
        let registered = self
            .registrar
            .register_device(token)
            .await
            .map_err(|e| AgentError::RegistrationFailed(Box::new(e)))?;

        // Reject unusable values before anything touches the disk.
        let identity = registered.into_identity(&self.project_id)?;
        self.store
            .save_registration(identity.device_id(), identity.access_key())
    }

    /// Probes a credential file, surfacing anything but absence.
    fn check(&self, name: &str) -> AgentResult<bool> {
        self.store
            .probe(&[name])
            .map_err(|source| AgentError::CredentialCheck {
                path: self.store.locate(&[name]),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use edgeplane_core::RegisteredDevice;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubRegistrar {
        fail: bool,
        injected: Mutex<Option<Arc<DeviceIdentity>>>,
    }

    #[async_trait]
    impl Registrar for StubRegistrar {
        async fn register_device(&self, _token: &str) -> AgentResult<RegisteredDevice> {
            if self.fail {
                return Err(AgentError::Rejected {
                    status: 403,
                    body: "invalid token".into(),
                });
            }
            Ok(RegisteredDevice {
                device_id: "dev_1".into(),
                device_access_key_value: "key_1".into(),
            })
        }

        async fn authenticate(&self, identity: Arc<DeviceIdentity>) {
            *self.injected.lock().unwrap() = Some(identity);
        }
    }

    fn registration(
        dir: &std::path::Path,
        registrar: Arc<StubRegistrar>,
        token: Option<&str>,
    ) -> Registration {
        Registration::new(
            CredentialStore::new(dir, "prj"),
            registrar,
            "prj",
            token.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn test_fresh_device_reaches_registered() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = Arc::new(StubRegistrar::default());
        let mut reg = registration(dir.path(), registrar.clone(), Some("tok"));
        assert_eq!(reg.state(), RegistrationState::Unregistered);

        let identity = reg.ensure_registered().await.unwrap();
        assert_eq!(reg.state(), RegistrationState::Registered);
        assert_eq!(identity.device_id(), "dev_1");
        assert_eq!(identity.access_key(), "key_1");
        assert_eq!(registrar.injected.lock().unwrap().as_ref(), Some(&identity));
    }

    #[tokio::test]
    async fn test_failure_reverts_to_unregistered() {
        let dir = tempfile::tempdir().unwrap();
        let registrar = Arc::new(StubRegistrar {
            fail: true,
            ..Default::default()
        });
        let mut reg = registration(dir.path(), registrar.clone(), Some("tok"));

        let err = reg.ensure_registered().await.unwrap_err();
        assert!(matches!(err, AgentError::RegistrationFailed(_)));
        assert!(err.is_fatal());
        assert_eq!(reg.state(), RegistrationState::Unregistered);
        assert!(registrar.injected.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_token_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registration(dir.path(), Arc::new(StubRegistrar::default()), None);

        assert!(matches!(
            reg.ensure_registered().await,
            Err(AgentError::MissingRegistrationToken)
        ));
        assert_eq!(reg.state(), RegistrationState::Unregistered);
    }

    #[tokio::test]
    async fn test_access_key_without_device_id_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path(), "prj");
        store.write(b"key_1", &[ACCESS_KEY_FILENAME]).unwrap();

        let mut reg = registration(dir.path(), Arc::new(StubRegistrar::default()), Some("tok"));
        assert!(matches!(
            reg.ensure_registered().await,
            Err(AgentError::PartialRegistration { .. })
        ));
    }
}
