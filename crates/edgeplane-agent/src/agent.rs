//! # Agent
//!
//! Entry point of the device agent: registers once, then runs the three
//! sync loops until told to stop.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Agent Architecture                             │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                            Agent                                 │  │
//! │  │                                                                  │  │
//! │  │  initialize():  Registration ──► Arc<DeviceIdentity>             │  │
//! │  │                 (fatal on error, loops never start)              │  │
//! │  │  start():       spawn one SyncLoop per action                    │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │SupervisionSync │  │ ConnectorSync  │  │       InfoSync         │    │
//! │  │   every 1s     │  │   every 1s     │  │      every 60s         │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  Each loop is its own task: a slow or failing collaborator delays      │
//! │  only its own loop. One ShutdownSignal stops all three.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use edgeplane_core::DeviceIdentity;

use crate::actions::{ConnectorSync, InfoSync, SupervisionSync};
use crate::client::{BundleSource, Registrar};
use crate::config::{AgentConfig, ScheduleConfig};
use crate::connector::Connector;
use crate::credentials::CredentialStore;
use crate::error::{AgentError, AgentResult};
use crate::info::InfoReporter;
use crate::registration::{Registration, RegistrationState};
use crate::supervisor::Supervisor;
use crate::sync_loop::{shutdown_channel, LoopStatus, ShutdownTrigger, SyncLoop, SyncLoopHandle};

// =============================================================================
// Agent Status
// =============================================================================

/// Snapshot of a running agent.
#[derive(Debug, Clone)]
pub struct AgentStatus {
    /// Device the loops act for.
    pub device_id: String,

    /// Per-loop counters keyed by loop name.
    pub loops: BTreeMap<&'static str, LoopStatus>,
}

// =============================================================================
// Agent Handle
// =============================================================================

/// Handle to the running sync loops.
pub struct AgentHandle {
    identity: Arc<DeviceIdentity>,
    shutdown: ShutdownTrigger,
    loops: Vec<SyncLoopHandle>,
}

impl AgentHandle {
    /// Returns the identity the loops run with.
    pub fn identity(&self) -> &Arc<DeviceIdentity> {
        &self.identity
    }

    /// Returns the current status of every loop.
    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            device_id: self.identity.device_id().to_string(),
            loops: self
                .loops
                .iter()
                .map(|handle| (handle.name(), handle.status()))
                .collect(),
        }
    }

    /// Returns the status of one loop by name.
    pub fn loop_status(&self, name: &str) -> Option<LoopStatus> {
        self.loops
            .iter()
            .find(|handle| handle.name() == name)
            .map(SyncLoopHandle::status)
    }

    /// Stops all loops and waits for them to exit.
    pub async fn shutdown(self) {
        info!("Stopping sync loops");
        self.shutdown.trigger();
        self.join().await;
        info!("Agent stopped");
    }

    /// Waits for the loops, which only return after shutdown.
    pub async fn wait(self) {
        self.join().await;
    }

    async fn join(self) {
        for handle in self.loops {
            handle.join().await;
        }
    }
}

// =============================================================================
// Agent
// =============================================================================

/// Device agent lifecycle.
///
/// ## Usage
/// ```rust,ignore
/// let agent = AgentBuilder::new(config)
///     .with_registrar(client.clone())
///     .with_bundle_source(client.clone())
///     .with_supervisor(supervisor)
///     .with_connector(connector)
///     .with_info_reporter(reporter)
///     .build()?;
///
/// agent.run_until(shutdown_signal()).await?;
/// ```
pub struct Agent {
    registration: Registration,
    identity: Option<Arc<DeviceIdentity>>,
    bundles: Arc<dyn BundleSource>,
    supervisor: Arc<dyn Supervisor>,
    connector: Arc<dyn Connector>,
    info_reporter: Arc<dyn InfoReporter>,
    schedule: ScheduleConfig,
}

impl Agent {
    /// Registers if needed and injects the credentials into the client.
    ///
    /// Runs registration at most once per agent; later calls return the
    /// identity from the first success.
    pub async fn initialize(&mut self) -> AgentResult<Arc<DeviceIdentity>> {
        if let Some(identity) = &self.identity {
            return Ok(identity.clone());
        }

        let identity = self.registration.ensure_registered().await?;
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    /// Returns the registration state.
    pub fn registration_state(&self) -> RegistrationState {
        self.registration.state()
    }

    /// Spawns the three sync loops.
    ///
    /// Fails unless [`Agent::initialize`] has succeeded.
    pub fn start(&self) -> AgentResult<AgentHandle> {
        let identity = self
            .identity
            .clone()
            .ok_or_else(|| AgentError::Internal("agent started before initialization".into()))?;

        let (trigger, signal) = shutdown_channel();
        let loops = vec![
            SyncLoop::spawn(
                Arc::new(SupervisionSync::new(self.bundles.clone(), self.supervisor.clone())),
                self.schedule.supervision_interval(),
                signal.clone(),
            ),
            SyncLoop::spawn(
                Arc::new(ConnectorSync::new(self.connector.clone())),
                self.schedule.connector_interval(),
                signal.clone(),
            ),
            SyncLoop::spawn(
                Arc::new(InfoSync::new(self.info_reporter.clone())),
                self.schedule.info_interval(),
                signal,
            ),
        ];

        info!(device_id = %identity.device_id(), "Agent running");
        Ok(AgentHandle {
            identity,
            shutdown: trigger,
            loops,
        })
    }

    /// Initializes, then runs the loops forever.
    pub async fn run(self) -> AgentResult<()> {
        self.run_until(std::future::pending()).await
    }

    /// Initializes, then runs the loops until `signal` resolves.
    ///
    /// A signal during initialization abandons it without error.
    pub async fn run_until<F>(mut self, signal: F) -> AgentResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);

        tokio::select! {
            result = self.initialize() => { result?; }
            _ = &mut signal => {
                warn!("Shutdown requested during initialization");
                return Ok(());
            }
        }

        let handle = self.start()?;
        signal.await;
        handle.shutdown().await;
        Ok(())
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating an Agent from config and collaborators.
pub struct AgentBuilder {
    config: AgentConfig,
    registrar: Option<Arc<dyn Registrar>>,
    bundles: Option<Arc<dyn BundleSource>>,
    supervisor: Option<Arc<dyn Supervisor>>,
    connector: Option<Arc<dyn Connector>>,
    info_reporter: Option<Arc<dyn InfoReporter>>,
}

impl AgentBuilder {
    /// Creates a new builder with the given config.
    pub fn new(config: AgentConfig) -> Self {
        AgentBuilder {
            config,
            registrar: None,
            bundles: None,
            supervisor: None,
            connector: None,
            info_reporter: None,
        }
    }

    pub fn with_registrar(mut self, registrar: Arc<dyn Registrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn with_bundle_source(mut self, bundles: Arc<dyn BundleSource>) -> Self {
        self.bundles = Some(bundles);
        self
    }

    pub fn with_supervisor(mut self, supervisor: Arc<dyn Supervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_info_reporter(mut self, info_reporter: Arc<dyn InfoReporter>) -> Self {
        self.info_reporter = Some(info_reporter);
        self
    }

    /// Builds the Agent.
    pub fn build(self) -> AgentResult<Agent> {
        self.config.validate()?;

        let registrar = self
            .registrar
            .ok_or_else(|| AgentError::InvalidConfig("Registrar required".into()))?;
        let bundles = self
            .bundles
            .ok_or_else(|| AgentError::InvalidConfig("Bundle source required".into()))?;
        let supervisor = self
            .supervisor
            .ok_or_else(|| AgentError::InvalidConfig("Supervisor required".into()))?;
        let connector = self
            .connector
            .ok_or_else(|| AgentError::InvalidConfig("Connector required".into()))?;
        let info_reporter = self
            .info_reporter
            .ok_or_else(|| AgentError::InvalidConfig("Info reporter required".into()))?;

        let project_id = self.config.project_id().to_string();
        let store = CredentialStore::new(self.config.state_dir(), &project_id);
        let registration = Registration::new(
            store,
            registrar,
            project_id,
            self.config.registration_token().map(str::to_string),
        );

        Ok(Agent {
            registration,
            identity: None,
            bundles,
            supervisor,
            connector,
            info_reporter,
            schedule: self.config.schedule,
        })
    }
}
