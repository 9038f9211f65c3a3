//! Test doubles for the agent's collaborators.
//!
//! Every fake counts its calls so tests can assert cadence and isolation
//! without a network or a workload engine.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use edgeplane_agent::{
    Agent, AgentBuilder, AgentConfig, AgentError, AgentResult, BundleSource, Connector,
    InfoReporter, Registrar, Supervisor,
};
use edgeplane_core::{ApplicationSpec, Bundle, DeviceIdentity, RegisteredDevice};

pub const PROJECT_ID: &str = "prj_test";
pub const ISSUED_DEVICE_ID: &str = "dev_issued";
pub const ISSUED_ACCESS_KEY: &str = "key_issued";

/// Fails cycles for which the predicate returns true (1-based).
pub type FailWhen = Box<dyn Fn(usize) -> bool + Send + Sync>;

// =============================================================================
// Control Plane
// =============================================================================

/// Registrar and bundle source in one, like the real client.
pub struct FakeControlPlane {
    pub register_calls: AtomicUsize,
    pub reject_registration: AtomicBool,
    pub authenticated: Mutex<Option<Arc<DeviceIdentity>>>,
    pub bundle_calls: AtomicUsize,
    fail_bundle: FailWhen,
}

impl FakeControlPlane {
    pub fn new() -> Arc<Self> {
        Self::failing_bundle(Box::new(|_| false))
    }

    pub fn failing_bundle(fail_bundle: FailWhen) -> Arc<Self> {
        Arc::new(FakeControlPlane {
            register_calls: AtomicUsize::new(0),
            reject_registration: AtomicBool::new(false),
            authenticated: Mutex::new(None),
            bundle_calls: AtomicUsize::new(0),
            fail_bundle,
        })
    }

    pub fn rejecting_registration() -> Arc<Self> {
        let fake = Self::new();
        fake.reject_registration.store(true, Ordering::SeqCst);
        fake
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn bundle_calls(&self) -> usize {
        self.bundle_calls.load(Ordering::SeqCst)
    }

    pub fn authenticated(&self) -> Option<Arc<DeviceIdentity>> {
        self.authenticated.lock().unwrap().clone()
    }
}

#[async_trait]
impl Registrar for FakeControlPlane {
    async fn register_device(&self, registration_token: &str) -> AgentResult<RegisteredDevice> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(registration_token, "drt_test");

        if self.reject_registration.load(Ordering::SeqCst) {
            return Err(AgentError::Rejected {
                status: 401,
                body: "unknown registration token".into(),
            });
        }
        Ok(RegisteredDevice {
            device_id: ISSUED_DEVICE_ID.into(),
            device_access_key_value: ISSUED_ACCESS_KEY.into(),
        })
    }

    async fn authenticate(&self, identity: Arc<DeviceIdentity>) {
        *self.authenticated.lock().unwrap() = Some(identity);
    }
}

#[async_trait]
impl BundleSource for FakeControlPlane {
    async fn get_bundle(&self) -> AgentResult<Bundle> {
        let n = self.bundle_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if (self.fail_bundle)(n) {
            return Err(AgentError::Transport(format!("bundle fetch {} refused", n)));
        }
        Ok(Bundle {
            applications: vec![ApplicationSpec {
                id: "app_1".into(),
                name: "web".into(),
                release_id: format!("rel_{}", n),
                ..Default::default()
            }],
        })
    }
}

// =============================================================================
// Loop Collaborators
// =============================================================================

#[derive(Default)]
pub struct RecordingSupervisor {
    pub calls: AtomicUsize,
    pub last: Mutex<Vec<ApplicationSpec>>,
}

impl RecordingSupervisor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Supervisor for RecordingSupervisor {
    fn set_applications(&self, applications: Vec<ApplicationSpec>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = applications;
    }
}

/// Connector that counts calls, or hangs forever when `stuck`.
#[derive(Default)]
pub struct CountingConnector {
    pub calls: AtomicUsize,
    pub stuck: bool,
}

impl CountingConnector {
    pub fn stuck() -> Arc<Self> {
        Arc::new(CountingConnector {
            calls: AtomicUsize::new(0),
            stuck: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for CountingConnector {
    async fn reconcile(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stuck {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Default)]
pub struct CountingInfoReporter {
    pub calls: AtomicUsize,
    pub always_fail: bool,
}

impl CountingInfoReporter {
    pub fn failing() -> Arc<Self> {
        Arc::new(CountingInfoReporter {
            calls: AtomicUsize::new(0),
            always_fail: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InfoReporter for CountingInfoReporter {
    async fn report(&self) -> AgentResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            return Err(AgentError::Timeout);
        }
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Fakes wired into one agent.
pub struct Harness {
    pub control_plane: Arc<FakeControlPlane>,
    pub supervisor: Arc<RecordingSupervisor>,
    pub connector: Arc<CountingConnector>,
    pub info: Arc<CountingInfoReporter>,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            control_plane: FakeControlPlane::new(),
            supervisor: Arc::new(RecordingSupervisor::default()),
            connector: Arc::new(CountingConnector::default()),
            info: Arc::new(CountingInfoReporter::default()),
        }
    }

    pub fn with_control_plane(mut self, control_plane: Arc<FakeControlPlane>) -> Self {
        self.control_plane = control_plane;
        self
    }

    pub fn with_connector(mut self, connector: Arc<CountingConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_info(mut self, info: Arc<CountingInfoReporter>) -> Self {
        self.info = info;
        self
    }

    /// Builds an agent storing credentials under `state_dir`.
    pub fn agent(&self, state_dir: &Path) -> Agent {
        AgentBuilder::new(config(state_dir))
            .with_registrar(self.control_plane.clone())
            .with_bundle_source(self.control_plane.clone())
            .with_supervisor(self.supervisor.clone())
            .with_connector(self.connector.clone())
            .with_info_reporter(self.info.clone())
            .build()
            .unwrap()
    }
}

pub fn config(state_dir: &Path) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.device.project_id = PROJECT_ID.into();
    config.device.registration_token = "drt_test".into();
    config.device.state_dir = state_dir.to_path_buf();
    config
}
