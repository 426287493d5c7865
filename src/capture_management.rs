//! Packet capture session management.
//!
//! This module owns the lifecycle of `tcpdump` capture sessions: starting the
//! capture process, tracking it in a lock-guarded registry, draining its
//! stderr into the log, stopping it on demand, and serving the resulting pcap
//! file exactly once before scheduling it for deletion.
//!
//! Re-exports:
//! - [`CaptureManager`]: main entry point for start/stop/download/shutdown.
//! - [`CaptureEngine`], [`TcpdumpEngine`]: process backends.
//! - [`CaptureFilter`]: builds the BPF filter expression from form input.
//!
//! Example (non-running):
//! ```ignore
//! use std::sync::Arc;
//! use hyyperwan::capture_management::{
//!     CaptureFilter, CaptureManager, ScratchDir, SessionStore, TcpdumpEngine,
//! };
//!
//! let manager = CaptureManager::new(
//!     Arc::new(TcpdumpEngine::new(true)),
//!     Arc::new(SessionStore::new()),
//!     ScratchDir::new("/tmp/hyyperwan_pcaps"),
//!     labels,
//!     host,
//!     delay,
//! )?;
//! let started = manager.start_capture("eth0", &CaptureFilter::default())?;
//! let stopped = manager.stop_capture(&started.capture_id.to_string()).await?;
//! println!("artifact: {}", stopped.file_name);
//! ```

use serde::{Deserialize, Serialize};

pub mod capture_engine;
pub mod capture_manager;
pub mod cleanup;
pub mod filter;
pub mod scratch;
pub mod session_store;
#[cfg(test)]
pub mod tests;
pub mod types;

pub use capture_engine::{CaptureEngine, CaptureHandle, CaptureRequest, TcpdumpEngine};
pub use capture_manager::CaptureManager;
pub use filter::{CaptureFilter, FilterLogic};
pub use scratch::ScratchDir;
pub use session_store::SessionStore;
pub use types::{CaptureSession, CaptureSummary, DownloadedCapture, StartedCapture, StoppedCapture};

/// Position of a capture session in its lifecycle.
///
/// Variants:
/// - `Active`: the capture process is running and owned by the session.
/// - `Stopped`: the process has exited; the artifact awaits download.
/// - `Downloaded`: the artifact was served. Terminal; set on the session
///   handed out by the download lookup, which is no longer in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Stopped,
    Downloaded,
}
