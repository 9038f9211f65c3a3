//! # Sync Actions
//!
//! The three periodic actions the agent runs after registration.
//!
//! | Action          | Period | Cycle                                        |
//! |-----------------|--------|----------------------------------------------|
//! | SupervisionSync | 1s     | GetBundle, then Supervisor.set_applications  |
//! | ConnectorSync   | 1s     | Connector.reconcile (never fails)            |
//! | InfoSync        | 60s    | InfoReporter.report                          |

use async_trait::async_trait;
use std::sync::Arc;

use crate::client::BundleSource;
use crate::connector::Connector;
use crate::error::AgentResult;
use crate::info::InfoReporter;
use crate::supervisor::Supervisor;
use crate::sync_loop::SyncAction;

/// Fetches the bundle and hands its applications to the supervisor.
///
/// The supervisor is left untouched when the fetch fails.
pub struct SupervisionSync {
    bundles: Arc<dyn BundleSource>,
    supervisor: Arc<dyn Supervisor>,
}

impl SupervisionSync {
    pub fn new(bundles: Arc<dyn BundleSource>, supervisor: Arc<dyn Supervisor>) -> Self {
        SupervisionSync { bundles, supervisor }
    }
}

#[async_trait]
impl SyncAction for SupervisionSync {
    fn name(&self) -> &'static str {
        "supervision"
    }

    async fn run_cycle(&self) -> AgentResult<()> {
        let bundle = self.bundles.get_bundle().await?;
        self.supervisor.set_applications(bundle.applications);
        Ok(())
    }
}

/// Runs one connector reconciliation step.
pub struct ConnectorSync {
    connector: Arc<dyn Connector>,
}

impl ConnectorSync {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        ConnectorSync { connector }
    }
}

#[async_trait]
impl SyncAction for ConnectorSync {
    fn name(&self) -> &'static str {
        "connector"
    }

    async fn run_cycle(&self) -> AgentResult<()> {
        self.connector.reconcile().await;
        Ok(())
    }
}

/// Uploads one device info report.
pub struct InfoSync {
    reporter: Arc<dyn InfoReporter>,
}

impl InfoSync {
    pub fn new(reporter: Arc<dyn InfoReporter>) -> Self {
        InfoSync { reporter }
    }
}

#[async_trait]
impl SyncAction for InfoSync {
    fn name(&self) -> &'static str {
        "info"
    }

    async fn run_cycle(&self) -> AgentResult<()> {
        self.reporter.report().await
    }
}
