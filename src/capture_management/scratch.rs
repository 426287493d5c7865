//! The scratch directory that holds capture artifacts.
//!
//! All pcap files live directly under one directory owned by this process.
//! It is created at startup, re-checked before every capture, and removed
//! wholesale at shutdown.

use std::fs;
use std::path::{Component, Path, PathBuf};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::error_handling::types::CaptureError;

#[derive(Debug, Clone)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the directory if needed and makes it `rwxr-xr-x`. Idempotent.
    pub fn ensure(&self) -> Result<(), CaptureError> {
        if !self.path.exists() {
            fs::create_dir_all(&self.path).map_err(|e| {
                error!(
                    "Failed to create capture directory {}: {}",
                    self.path.display(),
                    e
                );
                CaptureError::Directory(e)
            })?;
            info!("Created capture directory: {}", self.path.display());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.path)
                .map_err(|e| {
                    error!("Failed to get capture directory metadata: {}", e);
                    CaptureError::Directory(e)
                })?
                .permissions();
            if perms.mode() & 0o777 != 0o755 {
                perms.set_mode(0o755);
                fs::set_permissions(&self.path, perms).map_err(|e| {
                    error!("Failed to set capture directory permissions: {}", e);
                    CaptureError::Directory(e)
                })?;
            }
        }

        Ok(())
    }

    /// `capture_<interface>_<id>.pcap` inside the directory.
    pub fn artifact_path(&self, interface: &str, id: Uuid) -> PathBuf {
        self.path.join(format!("capture_{}_{}.pcap", interface, id))
    }

    /// Resolves a client supplied file name to a path inside the directory.
    ///
    /// Only a single plain file name component is accepted.
    pub fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        let candidate = Path::new(file_name);
        let mut components = candidate.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => Some(self.path.join(name)),
            _ => {
                warn!("Rejected capture file name: {:?}", file_name);
                None
            }
        }
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    pub fn size(&self, path: &Path) -> std::io::Result<u64> {
        fs::metadata(path).map(|m| m.len())
    }

    /// Removes the directory and everything left in it. Errors are logged.
    pub fn remove_all(&self) {
        if !self.path.exists() {
            debug!("Capture directory {} already gone", self.path.display());
            return;
        }
        info!("Removing capture directory: {}", self.path.display());
        if let Err(e) = fs::remove_dir_all(&self.path) {
            error!(
                "Error removing capture directory {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
