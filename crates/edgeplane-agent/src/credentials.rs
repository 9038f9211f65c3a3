//! # Credential Store
//!
//! Persists the device access key and device id under a per-project
//! directory.
//!
//! ## On-Disk Layout
//! ```text
//! <state_dir>/                    (created if absent)
//! └── <project_id>/               (mode 0700)
//!     ├── device-id               (mode 0600, written first)
//!     └── access-key              (mode 0600, written last: commit marker)
//! ```
//!
//! Files are written to a hidden temporary sibling and renamed into place,
//! so a reader never sees a half-written credential.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use edgeplane_core::{ACCESS_KEY_FILENAME, DEVICE_ID_FILENAME};

use crate::error::{AgentError, AgentResult};

/// Filesystem-backed store for the two device secrets.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
}

impl CredentialStore {
    /// Creates a store rooted at `<state_dir>/<project_id>`.
    pub fn new(state_dir: impl AsRef<Path>, project_id: &str) -> Self {
        CredentialStore {
            root: state_dir.as_ref().join(project_id),
        }
    }

    /// Returns the project directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Composes a path below the project directory.
    pub fn locate(&self, parts: &[&str]) -> PathBuf {
        parts.iter().fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Writes `contents` to the file named by `parts`.
    ///
    /// Creates the project directory with owner-only access if needed and
    /// the file with owner read/write access.
    pub fn write(&self, contents: &[u8], parts: &[&str]) -> io::Result<()> {
        let path = self.locate(parts);
        let dir = path.parent().unwrap_or(&self.root);
        create_private_dir(dir)?;

        let file_name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "credential path has no file name"))?;
        let mut tmp_name = std::ffi::OsString::from(".");
        tmp_name.push(file_name);
        tmp_name.push(".tmp");
        let tmp = dir.join(tmp_name);

        let result = write_private_file(&tmp, contents).and_then(|_| fs::rename(&tmp, &path));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result?;

        debug!(path = %path.display(), "Credential written");
        Ok(())
    }

    /// Returns whether the file exists, surfacing errors other than absence.
    pub fn probe(&self, parts: &[&str]) -> io::Result<bool> {
        match fs::metadata(self.locate(parts)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Returns whether the file exists. Any error reads as absent.
    pub fn exists(&self, parts: &[&str]) -> bool {
        self.probe(parts).unwrap_or(false)
    }

    /// Reads the raw file contents.
    pub fn read(&self, parts: &[&str]) -> io::Result<Vec<u8>> {
        fs::read(self.locate(parts))
    }

    // =========================================================================
    // Typed Accessors
    // =========================================================================

    /// Persists a freshly registered device's secrets.
    ///
    /// The device id goes first so that an access key on disk always
    /// implies a complete registration.
    pub fn save_registration(&self, device_id: &str, access_key: &str) -> AgentResult<()> {
        self.write(device_id.as_bytes(), &[DEVICE_ID_FILENAME])
            .map_err(|source| AgentError::CredentialWrite {
                path: self.locate(&[DEVICE_ID_FILENAME]),
                source,
            })?;
        self.write(access_key.as_bytes(), &[ACCESS_KEY_FILENAME])
            .map_err(|source| AgentError::CredentialWrite {
                path: self.locate(&[ACCESS_KEY_FILENAME]),
                source,
            })?;
        Ok(())
    }

    /// Reads a credential as trimmed UTF-8 text.
    pub fn read_credential(&self, name: &str) -> AgentResult<String> {
        let path = self.locate(&[name]);
        let bytes = self.read(&[name]).map_err(|source| AgentError::CredentialRead {
            path: path.clone(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|e| AgentError::CredentialRead {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AgentError::EmptyCredential { path });
        }
        Ok(trimmed.to_string())
    }
}

// =============================================================================
// Permission Helpers
// =============================================================================

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
