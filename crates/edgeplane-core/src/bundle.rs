//! # Bundles and Status Reports
//!
//! A [`Bundle`] is the set of applications the control plane wants running
//! on a device. The agent passes it to the supervisor without interpreting
//! service specs; only application identity and release are looked at.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// =============================================================================
// Bundle
// =============================================================================

/// Desired application set for one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Applications that should be running.
    #[serde(default)]
    pub applications: Vec<ApplicationSpec>,
}

impl Bundle {
    /// Looks up an application by id.
    pub fn application(&self, id: &str) -> Option<&ApplicationSpec> {
        self.applications.iter().find(|a| a.id == id)
    }

    /// Returns true if the bundle asks for nothing to run.
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

/// One application of a bundle at a specific release.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Application identifier.
    pub id: String,

    /// Human-readable name.
    #[serde(default)]
    pub name: String,

    /// Release the device should converge to.
    #[serde(default)]
    pub release_id: String,

    /// Service specifications keyed by service name, kept opaque.
    #[serde(default)]
    pub services: BTreeMap<String, serde_json::Value>,
}

// =============================================================================
// Status Report Bodies
// =============================================================================

/// Body of an application status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDeviceApplicationStatusRequest {
    pub current_release_id: String,
}

/// Body of a service status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDeviceServiceStatusRequest {
    pub current_release_id: String,
}

// =============================================================================
// Bundle Diff
// =============================================================================

/// Application-level difference between two desired sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleDiff {
    /// Applications present only in the new set.
    pub added: Vec<String>,
    /// Applications present only in the old set.
    pub removed: Vec<String>,
    /// Applications whose spec changed.
    pub updated: Vec<String>,
}

impl BundleDiff {
    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// Compares two application sets by id. Output lists are sorted.
pub fn diff_applications(old: &[ApplicationSpec], new: &[ApplicationSpec]) -> BundleDiff {
    let old_by_id: HashMap<&str, &ApplicationSpec> =
        old.iter().map(|a| (a.id.as_str(), a)).collect();
    let new_by_id: HashMap<&str, &ApplicationSpec> =
        new.iter().map(|a| (a.id.as_str(), a)).collect();

    let mut diff = BundleDiff::default();

    for (id, spec) in &new_by_id {
        match old_by_id.get(id) {
            None => diff.added.push(id.to_string()),
            Some(previous) if previous != spec => diff.updated.push(id.to_string()),
            Some(_) => {}
        }
    }
    for id in old_by_id.keys() {
        if !new_by_id.contains_key(id) {
            diff.removed.push(id.to_string());
        }
    }

    diff.added.sort();
    diff.removed.sort();
    diff.updated.sort();
    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str, release: &str) -> ApplicationSpec {
        ApplicationSpec {
            id: id.into(),
            name: id.into(),
            release_id: release.into(),
            services: BTreeMap::new(),
        }
    }

    #[test]
    fn test_bundle_wire_format() {
        let json = r#"{
            "applications": [
                {"id": "app_1", "name": "web", "releaseId": "rel_9",
                 "services": {"nginx": {"image": "nginx:1.25"}}}
            ]
        }"#;
        let bundle: Bundle = serde_json::from_str(json).unwrap();
        let web = bundle.application("app_1").unwrap();
        assert_eq!(web.release_id, "rel_9");
        assert_eq!(web.services["nginx"]["image"], "nginx:1.25");
    }

    #[test]
    fn test_empty_bundle_defaults() {
        let bundle: Bundle = serde_json::from_str("{}").unwrap();
        assert!(bundle.is_empty());
    }

    #[test]
    fn test_status_request_wire_format() {
        let body = SetDeviceApplicationStatusRequest {
            current_release_id: "rel_1".into(),
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"currentReleaseId":"rel_1"}"#
        );
    }

    #[test]
    fn test_diff_applications() {
        let old = vec![app("a", "1"), app("b", "1"), app("c", "1")];
        let new = vec![app("a", "1"), app("b", "2"), app("d", "1")];

        let diff = diff_applications(&old, &new);
        assert_eq!(diff.added, vec!["d"]);
        assert_eq!(diff.removed, vec!["c"]);
        assert_eq!(diff.updated, vec!["b"]);
        assert!(diff_applications(&new, &new).is_empty());
    }
}
