//! # Device Info
//!
//! Host facts uploaded by the info reporter once a minute.

use serde::{Deserialize, Serialize};

/// Snapshot of host facts sent to the control plane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub agent_version: String,
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub os_release: OsRelease,
}

/// Subset of `/etc/os-release`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsRelease {
    pub id: String,
    pub name: String,
    pub version_id: String,
    pub pretty_name: String,
}

impl OsRelease {
    /// Parses `os-release` contents.
    ///
    /// Blank lines, comments and unknown keys are skipped; values may be
    /// single- or double-quoted.
    pub fn parse(contents: &str) -> Self {
        let mut release = OsRelease::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, raw)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(raw.trim()).to_string();
            match key.trim() {
                "ID" => release.id = value,
                "NAME" => release.name = value,
                "VERSION_ID" => release.version_id = value,
                "PRETTY_NAME" => release.pretty_name = value,
                _ => {}
            }
        }

        release
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_os_release() {
        let contents = r#"
# comment
NAME="Ubuntu"
VERSION_ID='22.04'
ID=ubuntu
PRETTY_NAME="Ubuntu 22.04.4 LTS"
HOME_URL="https://www.ubuntu.com/"
garbage line
"#;
        let release = OsRelease::parse(contents);
        assert_eq!(release.id, "ubuntu");
        assert_eq!(release.name, "Ubuntu");
        assert_eq!(release.version_id, "22.04");
        assert_eq!(release.pretty_name, "Ubuntu 22.04.4 LTS");
    }

    #[test]
    fn test_device_info_skips_missing_fields() {
        let info = DeviceInfo {
            agent_version: "0.1.0".into(),
            hostname: "edge-1".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"agentVersion\":\"0.1.0\""));
        assert!(!json.contains("ipAddress"));
    }
}
