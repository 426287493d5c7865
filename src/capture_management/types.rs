//! Core types used by the capture management subsystem.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::SessionState;

/// Upper bound on packets written by one capture (`tcpdump -c`).
pub const MAX_PACKETS: u32 = 10_000;
/// How long a stop request waits for the process to honour SIGTERM.
pub const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause after termination so buffered packets reach the disk.
pub const FLUSH_GRACE: Duration = Duration::from_secs(1);
/// Default delay before a served artifact is deleted.
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(30);
/// Media type of served artifacts.
pub const PCAP_MIME_TYPE: &str = "application/vnd.tcpdump.pcap";

/// Metadata of one capture session.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    /// Generated at start time.
    pub id: Uuid,
    /// Interface the capture runs on (e.g. "eth0").
    pub interface_name: String,
    /// `eth0` or `eth0 (uplink)` when an alias is configured.
    pub display_name: String,
    /// Rendered BPF expression; empty when unfiltered.
    pub filter_expression: String,
    /// Absolute path of the pcap artifact.
    pub file_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub state: SessionState,
}

impl CaptureSession {
    /// Base name of the artifact, as handed back to clients.
    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            id: self.id,
            interface: self.interface_name.clone(),
            display_name: self.display_name.clone(),
            filter: self.filter_expression.clone(),
            file: self.file_name(),
            state: self.state,
            started_at: self.started_at.to_rfc3339(),
            stopped_at: self.stopped_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Serializable view of a session for listings.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub id: Uuid,
    pub interface: String,
    pub display_name: String,
    pub filter: String,
    pub file: String,
    pub state: SessionState,
    pub started_at: String,
    pub stopped_at: Option<String>,
}

/// Result of a successful start request.
#[derive(Debug, Clone)]
pub struct StartedCapture {
    pub capture_id: Uuid,
    pub display_name: String,
    pub filter_expression: String,
}

/// Result of a successful stop request.
#[derive(Debug, Clone)]
pub struct StoppedCapture {
    pub capture_id: Uuid,
    pub display_name: String,
    pub file_name: String,
    pub file_size: u64,
}

/// Artifact bytes handed to the request layer.
#[derive(Debug, Clone)]
pub struct DownloadedCapture {
    pub file_name: String,
    pub contents: Vec<u8>,
}
