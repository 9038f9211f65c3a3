//! # Control Plane Client
//!
//! Narrow capability traits the agent depends on, and the HTTP client that
//! implements them.
//!
//! ## Capabilities
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Control Plane Capabilities                         │
//! │                                                                         │
//! │  Registrar     register_device(token)      → RegisteredDevice          │
//! │                authenticate(identity)      (inject credentials)        │
//! │                                                                         │
//! │  BundleSource  get_bundle()                → Bundle                    │
//! │                                                                         │
//! │  StatusSink    set_device_application_status(app, {currentReleaseId})  │
//! │                set_device_service_status(app, svc, {currentReleaseId}) │
//! │                                                                         │
//! │  InfoSink      set_device_info(DeviceInfo)                             │
//! │                                                                         │
//! │  HttpControlPlane implements all four; tests substitute fakes.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## HTTP Routes
//! ```text
//! POST {url}/projects/{p}/devices/register
//! GET  {url}/projects/{p}/devices/{d}/bundle
//! POST {url}/projects/{p}/devices/{d}/applications/{a}/deviceapplicationstatuses
//! POST {url}/projects/{p}/devices/{d}/applications/{a}/services/{s}/deviceservicestatuses
//! POST {url}/projects/{p}/devices/{d}/info
//! ```
//!
//! Authenticated routes send `Authorization: Bearer <access key>`.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use edgeplane_core::{
    Bundle, DeviceIdentity, DeviceInfo, RegisteredDevice, SetDeviceApplicationStatusRequest,
    SetDeviceServiceStatusRequest,
};

use crate::config::ControllerConfig;
use crate::error::{AgentError, AgentResult};

// =============================================================================
// Capability Traits
// =============================================================================

/// Registration and credential injection.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Exchanges a registration token for a device id and access key.
    async fn register_device(&self, registration_token: &str) -> AgentResult<RegisteredDevice>;

    /// Configures subsequent calls with the device's credentials.
    async fn authenticate(&self, identity: Arc<DeviceIdentity>);
}

/// Source of the device's desired application set.
#[async_trait]
pub trait BundleSource: Send + Sync {
    async fn get_bundle(&self) -> AgentResult<Bundle>;
}

/// Receiver of application and service status reports.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn set_device_application_status(
        &self,
        application_id: &str,
        request: SetDeviceApplicationStatusRequest,
    ) -> AgentResult<()>;

    async fn set_device_service_status(
        &self,
        application_id: &str,
        service: &str,
        request: SetDeviceServiceStatusRequest,
    ) -> AgentResult<()>;
}

/// Receiver of device info reports.
#[async_trait]
pub trait InfoSink: Send + Sync {
    async fn set_device_info(&self, info: &DeviceInfo) -> AgentResult<()>;
}

// =============================================================================
// HTTP Control Plane
// =============================================================================

/// reqwest-backed control-plane client.
///
/// Safe for concurrent use: every call is an independent request, and the
/// identity is only read after `authenticate`.
pub struct HttpControlPlane {
    http: reqwest::Client,
    base: Url,
    project_id: String,
    identity: RwLock<Option<Arc<DeviceIdentity>>>,
}

impl HttpControlPlane {
    /// Creates a client for one project.
    pub fn new(config: &ControllerConfig, project_id: &str) -> AgentResult<Self> {
        let base = config.parsed_url()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(concat!("edgeplane-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpControlPlane {
            http,
            base,
            project_id: project_id.to_string(),
            identity: RwLock::new(None),
        })
    }

    /// Returns the controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Returns the injected identity.
    pub async fn identity(&self) -> AgentResult<Arc<DeviceIdentity>> {
        self.identity
            .read()
            .await
            .clone()
            .ok_or(AgentError::NotAuthenticated)
    }

    /// Builds `{base}/{segments...}` with each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> AgentResult<Url> {
        build_endpoint(&self.base, segments)
    }

    /// Builds a route below `projects/{p}/devices/{d}/`.
    async fn device_endpoint(&self, tail: &[&str]) -> AgentResult<(Url, Arc<DeviceIdentity>)> {
        let identity = self.identity().await?;
        let mut segments = vec!["projects", identity.project_id(), "devices", identity.device_id()];
        segments.extend_from_slice(tail);
        let url = self.endpoint(&segments)?;
        Ok((url, identity))
    }

    async fn post_authenticated<T: Serialize + ?Sized>(&self, tail: &[&str], body: &T) -> AgentResult<()> {
        let (url, identity) = self.device_endpoint(tail).await?;
        debug!(%url, "POST");
        let response = self
            .http
            .post(url)
            .bearer_auth(identity.access_key())
            .json(body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Registrar for HttpControlPlane {
    async fn register_device(&self, registration_token: &str) -> AgentResult<RegisteredDevice> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RegisterDeviceRequest<'a> {
            device_registration_token_id: &'a str,
        }

        let url = self.endpoint(&["projects", &self.project_id, "devices", "register"])?;
        debug!(%url, "Registering device");
        let response = self
            .http
            .post(url)
            .json(&RegisterDeviceRequest {
                device_registration_token_id: registration_token,
            })
            .send()
            .await?;
        let response = check_status(response).await?;
        let registered: RegisteredDevice = response.json().await?;

        info!(device_id = %registered.device_id, "Device registered with control plane");
        Ok(registered)
    }

    async fn authenticate(&self, identity: Arc<DeviceIdentity>) {
        debug!(device_id = %identity.device_id(), "Control plane credentials injected");
        *self.identity.write().await = Some(identity);
    }
}

#[async_trait]
impl BundleSource for HttpControlPlane {
    async fn get_bundle(&self) -> AgentResult<Bundle> {
        let (url, identity) = self.device_endpoint(&["bundle"]).await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(identity.access_key())
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl StatusSink for HttpControlPlane {
    async fn set_device_application_status(
        &self,
        application_id: &str,
        request: SetDeviceApplicationStatusRequest,
    ) -> AgentResult<()> {
        self.post_authenticated(
            &["applications", application_id, "deviceapplicationstatuses"],
            &request,
        )
        .await
    }

    async fn set_device_service_status(
        &self,
        application_id: &str,
        service: &str,
        request: SetDeviceServiceStatusRequest,
    ) -> AgentResult<()> {
        self.post_authenticated(
            &["applications", application_id, "services", service, "deviceservicestatuses"],
            &request,
        )
        .await
    }
}

#[async_trait]
impl InfoSink for HttpControlPlane {
    async fn set_device_info(&self, info: &DeviceInfo) -> AgentResult<()> {
        self.post_authenticated(&["info"], info).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub(crate) fn build_endpoint(base: &Url, segments: &[&str]) -> AgentResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AgentError::InvalidUrl(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Maps non-success responses to [`AgentError::Rejected`].
async fn check_status(response: reqwest::Response) -> AgentResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AgentError::Rejected {
        status: status.as_u16(),
        body: body.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> HttpControlPlane {
        let config = ControllerConfig {
            url: url.to_string(),
            ..Default::default()
        };
        HttpControlPlane::new(&config, "prj_1").unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let cp = client("https://cp.example.com/api");
        let url = cp.endpoint(&["projects", "prj_1", "devices", "register"]).unwrap();
        assert_eq!(url.as_str(), "https://cp.example.com/api/projects/prj_1/devices/register");

        let cp = client("https://cp.example.com/api/");
        let url = cp.endpoint(&["projects", "prj_1"]).unwrap();
        assert_eq!(url.as_str(), "https://cp.example.com/api/projects/prj_1");
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let cp = client("http://localhost:8080");
        let url = cp.endpoint(&["applications", "my app/1"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/applications/my%20app%2F1");
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let config = ControllerConfig {
            url: "ftp://cp.example.com".into(),
            ..Default::default()
        };
        assert!(matches!(
            HttpControlPlane::new(&config, "prj_1"),
            Err(AgentError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticated_calls_require_identity() {
        let cp = client("http://127.0.0.1:9");
        assert!(matches!(cp.get_bundle().await, Err(AgentError::NotAuthenticated)));

        let identity = Arc::new(DeviceIdentity::new("prj_1", "dev_1", "key").unwrap());
        cp.authenticate(identity.clone()).await;
        assert_eq!(cp.identity().await.unwrap(), identity);

        let (url, _) = cp.device_endpoint(&["bundle"]).await.unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/projects/prj_1/devices/dev_1/bundle");
    }
}
