//! # Device Info Reporter
//!
//! Collects a [`DeviceInfo`] snapshot from the host and uploads it.
//!
//! | Field          | Source                                        |
//! |----------------|-----------------------------------------------|
//! | agent_version  | crate version                                 |
//! | hostname       | /proc/sys/kernel/hostname, else /etc/hostname |
//! | kernel_release | /proc/sys/kernel/osrelease                    |
//! | os_release     | /etc/os-release                               |
//! | ip_address     | local address of a UDP socket aimed at the    |
//! |                | controller (no packet is sent)                |

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::debug;
use url::Url;

use edgeplane_core::{DeviceInfo, OsRelease, AGENT_VERSION};

use crate::client::InfoSink;
use crate::error::{AgentError, AgentResult};

/// Reports device info once per call.
#[async_trait]
pub trait InfoReporter: Send + Sync {
    async fn report(&self) -> AgentResult<()>;
}

/// [`InfoReporter`] reading facts from the local host.
pub struct HostInfoReporter {
    sink: Arc<dyn InfoSink>,
    controller: Url,
    root: PathBuf,
}

impl HostInfoReporter {
    pub fn new(sink: Arc<dyn InfoSink>, controller: Url) -> Self {
        HostInfoReporter {
            sink,
            controller,
            root: PathBuf::from("/"),
        }
    }

    /// Reads host files below `root` instead of `/`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Gathers the current snapshot.
    pub async fn collect(&self) -> AgentResult<DeviceInfo> {
        let hostname = read_first(&self.root, &["proc/sys/kernel/hostname", "etc/hostname"])
            .ok_or_else(|| AgentError::Internal("hostname unavailable".into()))?;
        let kernel_release = read_first(&self.root, &["proc/sys/kernel/osrelease"]);
        let os_release = std::fs::read_to_string(self.root.join("etc/os-release"))
            .map(|contents| OsRelease::parse(&contents))
            .unwrap_or_default();

        Ok(DeviceInfo {
            agent_version: AGENT_VERSION.to_string(),
            hostname,
            kernel_release,
            ip_address: self.outbound_address().await,
            os_release,
        })
    }

    async fn outbound_address(&self) -> Option<String> {
        let host = self.controller.host_str()?;
        let port = self.controller.port_or_known_default()?;

        let probe = async {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect((host, port)).await?;
            Ok::<_, std::io::Error>(socket.local_addr()?)
        };
        match probe.await {
            Ok(addr) => Some(addr.ip().to_string()),
            Err(e) => {
                debug!(error = %e, host, "Could not determine outbound address");
                None
            }
        }
    }
}

#[async_trait]
impl InfoReporter for HostInfoReporter {
    async fn report(&self) -> AgentResult<()> {
        let info = self.collect().await?;
        self.sink.set_device_info(&info).await?;
        debug!(hostname = %info.hostname, ip_address = ?info.ip_address, "Device info reported");
        Ok(())
    }
}

/// Returns the first non-empty trimmed file among `candidates`.
fn read_first(root: &Path, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|relative| {
        std::fs::read_to_string(root.join(relative))
            .ok()
            .map(|contents| contents.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<DeviceInfo>>,
    }

    #[async_trait]
    impl InfoSink for RecordingSink {
        async fn set_device_info(&self, info: &DeviceInfo) -> AgentResult<()> {
            self.reports.lock().unwrap().push(info.clone());
            Ok(())
        }
    }

    fn fake_root() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("proc/sys/kernel")).unwrap();
        fs::create_dir_all(root.path().join("etc")).unwrap();
        fs::write(root.path().join("etc/hostname"), "edge-7\n").unwrap();
        fs::write(root.path().join("proc/sys/kernel/osrelease"), "6.1.0-rpi\n").unwrap();
        fs::write(
            root.path().join("etc/os-release"),
            "ID=debian\nVERSION_ID=\"12\"\nPRETTY_NAME=\"Debian GNU/Linux 12\"\n",
        )
        .unwrap();
        root
    }

    #[tokio::test]
    async fn test_report_collects_host_facts() {
        let root = fake_root();
        let sink = Arc::new(RecordingSink::default());
        let reporter = HostInfoReporter::new(sink.clone(), Url::parse("http://127.0.0.1:8080").unwrap())
            .with_root(root.path());

        reporter.report().await.unwrap();

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].agent_version, AGENT_VERSION);
        assert_eq!(reports[0].hostname, "edge-7");
        assert_eq!(reports[0].kernel_release.as_deref(), Some("6.1.0-rpi"));
        assert_eq!(reports[0].os_release.id, "debian");
        assert_eq!(reports[0].os_release.version_id, "12");
    }

    #[tokio::test]
    async fn test_missing_hostname_fails_report() {
        let root = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let reporter = HostInfoReporter::new(sink.clone(), Url::parse("http://127.0.0.1:8080").unwrap())
            .with_root(root.path());

        assert!(reporter.report().await.is_err());
        assert!(sink.reports.lock().unwrap().is_empty());
    }
}
