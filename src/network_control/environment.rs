//! Facts about the host the panel runs on.

use std::ffi::CStr;
use std::path::Path;

use log::{debug, warn};

/// Marker file present inside Docker containers.
pub const CONTAINER_MARKER: &str = "/.dockerenv";

/// Detected once at startup and passed to the subsystems that need it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    /// Running inside a container: host identity and NAT rules need `nsenter`.
    pub in_container: bool,
    /// Login name tcpdump drops privileges to.
    pub login_user: Option<String>,
}

impl HostEnvironment {
    pub fn detect() -> Self {
        let env = Self {
            in_container: marker_present(Path::new(CONTAINER_MARKER)),
            login_user: login_user(),
        };
        debug!("Detected host environment: {:?}", env);
        env
    }
}

pub fn marker_present(marker: &Path) -> bool {
    marker.exists()
}

/// `getlogin(3)`, falling back to `SUDO_USER` when there is no controlling tty.
pub fn login_user() -> Option<String> {
    // SAFETY: getlogin returns NULL or a pointer to a static NUL-terminated buffer.
    let ptr = unsafe { libc::getlogin() };
    if !ptr.is_null() {
        let name = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        if !name.is_empty() {
            return Some(name);
        }
    }
    match std::env::var("SUDO_USER") {
        Ok(user) if !user.is_empty() => Some(user),
        _ => {
            warn!("Could not determine login user");
            None
        }
    }
}

/// `gethostname(2)`, or `"Unknown"` when it fails.
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer outlives the call and its length is passed along.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        warn!(
            "gethostname failed: {}",
            std::io::Error::last_os_error()
        );
        return "Unknown".to_string();
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
