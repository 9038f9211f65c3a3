//! # edgeplane-agent: Device Agent Lifecycle
//!
//! This crate turns a freshly imaged device into a managed member of an
//! edgeplane project and keeps it synchronized with the control plane.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Device Agent Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      Agent (Main Orchestrator)                   │  │
//! │  │                                                                  │  │
//! │  │  initialize() once ──► start() three loops ──► run until signal  │  │
//! │  └───────┬──────────────────────────────────────────────────────────┘  │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Registration   │─►│CredentialStore │  │   HttpControlPlane     │    │
//! │  │ Unregistered → │  │ access-key     │  │ Registrar              │    │
//! │  │ Registering →  │  │ device-id      │  │ BundleSource           │    │
//! │  │ Registered     │  │ (0700 / 0600)  │  │ StatusSink, InfoSink   │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │SupervisionSync │  │ ConnectorSync  │  │       InfoSync         │    │
//! │  │ 1s: bundle →   │  │ 1s: tunnel     │  │ 60s: host facts →      │    │
//! │  │ Supervisor     │  │ reconcile      │  │ control plane          │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  FAILURE HANDLING:                                                     │
//! │  • Anything before the loops start is fatal                            │
//! │  • A failed cycle is logged and skipped; its loop carries on           │
//! │  • Loops run on separate tasks and never wait on each other            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Lifecycle
//! - [`agent`] - `Agent` orchestrator, builder and running handle
//! - [`registration`] - Registration state machine
//! - [`credentials`] - On-disk access key and device id
//! - [`config`] - Agent configuration (file, env, defaults)
//! - [`error`] - Agent error types
//!
//! ### Sync Loops
//! - [`sync_loop`] - Periodic loop runtime and shutdown signal
//! - [`actions`] - The three sync actions
//!
//! ### Collaborators
//! - [`client`] - Capability traits and the HTTP control-plane client
//! - [`supervisor`] - Desired application set and status reporting
//! - [`connector`] - Remote-access tunnel
//! - [`info`] - Device info reporting
//!
//! ## Usage
//!
//! ```rust,ignore
//! use edgeplane_agent::{AgentBuilder, AgentConfig, HttpControlPlane};
//!
//! let config = AgentConfig::load(None)?;
//! let client = Arc::new(HttpControlPlane::new(&config.controller, config.project_id())?);
//!
//! let agent = AgentBuilder::new(config)
//!     .with_registrar(client.clone())
//!     .with_bundle_source(client.clone())
//!     .with_supervisor(supervisor)
//!     .with_connector(connector)
//!     .with_info_reporter(reporter)
//!     .build()?;
//!
//! agent.run().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Lifecycle
pub mod agent;
pub mod config;
pub mod credentials;
pub mod error;
pub mod registration;

// Sync loops
pub mod actions;
pub mod sync_loop;

// Collaborators
pub mod client;
pub mod connector;
pub mod info;
pub mod supervisor;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{Agent, AgentBuilder, AgentHandle, AgentStatus};
pub use config::AgentConfig;
pub use credentials::CredentialStore;
pub use error::{AgentError, AgentResult};
pub use registration::{Registration, RegistrationState};

pub use actions::{ConnectorSync, InfoSync, SupervisionSync};
pub use sync_loop::{shutdown_channel, LoopStatus, ShutdownSignal, ShutdownTrigger, SyncAction, SyncLoop};

pub use client::{BundleSource, HttpControlPlane, InfoSink, Registrar, StatusSink};
pub use connector::{ConnectionState, Connector, TunnelConfig, TunnelConnector, TunnelFrame};
pub use info::{HostInfoReporter, InfoReporter};
pub use supervisor::{DesiredStateSupervisor, StatusReporter, Supervisor};
