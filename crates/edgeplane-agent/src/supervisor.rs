//! # Supervisor Adapter
//!
//! The supervision loop hands every fetched bundle to a [`Supervisor`].
//! Reconciling running workloads against that set belongs to whatever
//! engine subscribes to [`DesiredStateSupervisor`]; this module only holds
//! the desired set and forwards the engine's status callbacks upstream.
//!
//! ```text
//!   SupervisionSync ──set_applications──► DesiredStateSupervisor
//!                                              │ watch (only on change)
//!                                              ▼
//!                                        workload engine
//!                                              │ application_running()
//!                                              │ service_running()
//!                                              ▼
//!                                        StatusReporter ──► StatusSink
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info};

use edgeplane_core::{
    diff_applications, ApplicationSpec, SetDeviceApplicationStatusRequest,
    SetDeviceServiceStatusRequest,
};

use crate::client::StatusSink;
use crate::error::AgentResult;

/// Accepts the desired application set.
///
/// Called once per supervision cycle with the full set, changed or not.
/// Must return promptly; long-running work belongs on another task.
pub trait Supervisor: Send + Sync {
    fn set_applications(&self, applications: Vec<ApplicationSpec>);
}

// =============================================================================
// Desired State Supervisor
// =============================================================================

/// Shared handle to the latest desired application set.
pub type DesiredApplications = Arc<Vec<ApplicationSpec>>;

/// Holds the desired set and notifies subscribers when it changes.
pub struct DesiredStateSupervisor {
    desired: watch::Sender<DesiredApplications>,
    reporter: Arc<StatusReporter>,
}

impl DesiredStateSupervisor {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        let (desired, _) = watch::channel(Arc::new(Vec::new()));
        DesiredStateSupervisor {
            desired,
            reporter: Arc::new(StatusReporter::new(sink)),
        }
    }

    /// Subscribes to desired-set changes.
    pub fn subscribe(&self) -> watch::Receiver<DesiredApplications> {
        self.desired.subscribe()
    }

    /// Returns the current desired set.
    pub fn desired(&self) -> DesiredApplications {
        self.desired.borrow().clone()
    }

    /// Returns the status callback handle for the workload engine.
    pub fn reporter(&self) -> Arc<StatusReporter> {
        self.reporter.clone()
    }
}

impl Supervisor for DesiredStateSupervisor {
    fn set_applications(&self, applications: Vec<ApplicationSpec>) {
        let diff = diff_applications(&self.desired.borrow(), &applications);
        if diff.is_empty() {
            return;
        }

        info!(
            added = ?diff.added,
            removed = ?diff.removed,
            updated = ?diff.updated,
            "Desired applications changed"
        );
        self.reporter.forget(&diff.removed);
        self.desired.send_replace(Arc::new(applications));
    }
}

// =============================================================================
// Status Reporter
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StatusKey {
    application_id: String,
    service: Option<String>,
}

/// Forwards running-release reports to the control plane.
///
/// A report is sent only when the release differs from the last one
/// accepted for the same application or service.
pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
    reported: Mutex<HashMap<StatusKey, String>>,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        StatusReporter {
            sink,
            reported: Mutex::new(HashMap::new()),
        }
    }

    /// Reports that an application runs `release_id`.
    pub async fn application_running(&self, application_id: &str, release_id: &str) -> AgentResult<()> {
        let key = StatusKey {
            application_id: application_id.to_string(),
            service: None,
        };
        if self.already_reported(&key, release_id) {
            return Ok(());
        }

        self.sink
            .set_device_application_status(
                application_id,
                SetDeviceApplicationStatusRequest {
                    current_release_id: release_id.to_string(),
                },
            )
            .await?;

        debug!(application_id, release_id, "Application status reported");
        self.remember(key, release_id);
        Ok(())
    }

    /// Reports that one service of an application runs `release_id`.
    pub async fn service_running(
        &self,
        application_id: &str,
        service: &str,
        release_id: &str,
    ) -> AgentResult<()> {
        let key = StatusKey {
            application_id: application_id.to_string(),
            service: Some(service.to_string()),
        };
        if self.already_reported(&key, release_id) {
            return Ok(());
        }

        self.sink
            .set_device_service_status(
                application_id,
                service,
                SetDeviceServiceStatusRequest {
                    current_release_id: release_id.to_string(),
                },
            )
            .await?;

        debug!(application_id, service, release_id, "Service status reported");
        self.remember(key, release_id);
        Ok(())
    }

    fn already_reported(&self, key: &StatusKey, release_id: &str) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|reported| reported == release_id)
    }

    fn remember(&self, key: StatusKey, release_id: &str) {
        self.lock().insert(key, release_id.to_string());
    }

    /// Drops cached reports of removed applications.
    fn forget(&self, application_ids: &[String]) {
        if application_ids.is_empty() {
            return;
        }
        self.lock()
            .retain(|key, _| !application_ids.contains(&key.application_id));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<StatusKey, String>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.reported.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
