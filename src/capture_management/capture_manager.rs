use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::capture_management::capture_engine::{CaptureEngine, CaptureHandle, CaptureRequest};
use crate::capture_management::cleanup::CleanupScheduler;
use crate::capture_management::filter::CaptureFilter;
use crate::capture_management::scratch::ScratchDir;
use crate::capture_management::session_store::{
    ActiveCapture, DownloadLookup, SessionStore, StopClaim,
};
use crate::capture_management::types::{
    CaptureSession, CaptureSummary, DownloadedCapture, StartedCapture, StoppedCapture,
    FLUSH_GRACE, MAX_PACKETS, TERMINATE_TIMEOUT,
};
use crate::capture_management::SessionState;
use crate::error_handling::types::CaptureError;
use crate::network_control::environment::HostEnvironment;
use crate::network_control::labels::{display_name, InterfaceLabels};

/// Upper bound on waiting for the stderr drain once the process has exited.
const DRAIN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Orchestrates packet capture sessions.
///
/// The manager owns the scratch directory, the session registry and the
/// deferred cleanup timers. It delegates process handling to an injected
/// [`CaptureEngine`].
///
/// Design notes:
/// - Artifacts are written to `<scratch>/capture_<iface>_<uuid>.pcap`, so two
///   sessions can never share a path.
/// - Stopping blocks for up to the termination timeout plus a one second
///   flush grace; callers should not run it on a latency sensitive path.
/// - [`CaptureManager::shutdown`] runs once, either explicitly or on drop.
pub struct CaptureManager {
    engine: Arc<dyn CaptureEngine>,
    store: Arc<SessionStore>,
    scratch: ScratchDir,
    cleanup: CleanupScheduler,
    labels: Arc<dyn InterfaceLabels>,
    host: HostEnvironment,
    shut_down: AtomicBool,
}

impl CaptureManager {
    /// Creates a new `CaptureManager` and makes sure the scratch directory exists.
    pub fn new(
        engine: Arc<dyn CaptureEngine>,
        store: Arc<SessionStore>,
        scratch: ScratchDir,
        labels: Arc<dyn InterfaceLabels>,
        host: HostEnvironment,
        cleanup_delay: Duration,
    ) -> Result<Self, CaptureError> {
        info!(
            "Initializing CaptureManager with scratch directory {}",
            scratch.path().display()
        );
        scratch.ensure()?;

        Ok(Self {
            engine,
            store,
            scratch,
            cleanup: CleanupScheduler::new(cleanup_delay),
            labels,
            host,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Starts a capture on `interface` and registers it as active.
    ///
    /// Returns as soon as the process is spawned; capturing continues in the
    /// background until [`stop_capture`](Self::stop_capture) or shutdown.
    pub fn start_capture(
        &self,
        interface: &str,
        filter: &CaptureFilter,
    ) -> Result<StartedCapture, CaptureError> {
        let interface = validate_interface(interface)?;
        let display_name = display_name(self.labels.as_ref(), interface);
        let filter_expression = filter.expression();

        self.scratch.ensure()?;

        let id = Uuid::new_v4();
        let file_path = self.scratch.artifact_path(interface, id);

        let identity_user = if self.host.in_container {
            info!("Running inside a container, omitting '-Z' option from tcpdump command");
            None
        } else {
            if self.host.login_user.is_none() {
                warn!("Could not get login user, omitting '-Z' option from tcpdump command");
            }
            self.host.login_user.clone()
        };

        let request = CaptureRequest {
            interface: interface.to_string(),
            output_path: file_path.clone(),
            max_packets: MAX_PACKETS,
            filter_expression: filter_expression.clone(),
            identity_user,
        };

        let mut process = self.engine.start(&request).map_err(|e| {
            error!("[{}] Error starting packet capture on {}: {}", id, interface, e);
            e
        })?;

        let stderr_drain = process
            .take_stderr()
            .map(|stderr| spawn_stderr_drain(id, stderr));

        let session = CaptureSession {
            id,
            interface_name: interface.to_string(),
            display_name: display_name.clone(),
            filter_expression: filter_expression.clone(),
            file_path,
            started_at: Utc::now(),
            stopped_at: None,
            state: SessionState::Active,
        };

        info!(
            "[{}] Capture started on {} (filter: {:?}, file: {})",
            id,
            display_name,
            filter_expression,
            session.file_path.display()
        );

        self.store.insert_active(ActiveCapture {
            session,
            process: Some(process),
            stderr_drain,
        });

        Ok(StartedCapture {
            capture_id: id,
            display_name,
            filter_expression,
        })
    }

    /// Stops an active capture and moves it to the completed registry.
    pub async fn stop_capture(&self, capture_id: &str) -> Result<StoppedCapture, CaptureError> {
        let id = parse_capture_id(capture_id)
            .ok_or_else(|| CaptureError::NotFound("Capture not found".to_string()))?;

        let (mut process, stderr_drain) = match self.store.claim_for_stop(&id) {
            StopClaim::Claimed {
                process,
                stderr_drain,
            } => (process, stderr_drain),
            StopClaim::AlreadyStopping => {
                return Err(CaptureError::Conflict(
                    "Capture is already being stopped".to_string(),
                ))
            }
            StopClaim::Unknown => {
                debug!("[{}] Stop requested for unknown capture", id);
                return Err(CaptureError::NotFound("Capture not found".to_string()));
            }
        };

        // The claimed process lives in this task until the session is completed,
        // so the stop finishes even if the caller goes away.
        let store = Arc::clone(&self.store);
        let finish = tokio::spawn(async move {
            terminate_process(id, process.as_mut()).await;
            join_stderr_drain(id, stderr_drain).await;

            // Let tcpdump's buffered output reach the disk.
            tokio::time::sleep(FLUSH_GRACE).await;
            store.complete(&id)
        });

        let completed = match finish.await {
            Ok(completed) => completed,
            Err(e) => {
                error!("[{}] Stop task failed: {}", id, e);
                self.store.complete(&id)
            }
        };

        let session = completed.ok_or_else(|| {
            warn!("[{}] Capture vanished from the registry while stopping", id);
            CaptureError::NotFound("Capture not found".to_string())
        })?;

        if !self.scratch.exists(&session.file_path) {
            error!(
                "[{}] PCAP file not found after capture: {}",
                id,
                session.file_path.display()
            );
            return Err(CaptureError::ArtifactMissing(session.file_path));
        }

        let file_size = self.scratch.size(&session.file_path).unwrap_or(0);
        info!(
            "[{}] Capture completed. File: {}, Size: {} bytes",
            id,
            session.file_path.display(),
            file_size
        );

        Ok(StoppedCapture {
            capture_id: id,
            display_name: session.display_name.clone(),
            file_name: session.file_name(),
            file_size,
        })
    }

    /// Serves a stopped capture's artifact.
    ///
    /// The completed registry is consulted first and its entry is consumed, so
    /// an id can be downloaded once. Without a registry entry, `file_name` is
    /// resolved inside the scratch directory instead. Either way the file is
    /// scheduled for deletion after the configured delay.
    pub async fn download_capture(
        &self,
        capture_id: &str,
        file_name: Option<&str>,
    ) -> Result<DownloadedCapture, CaptureError> {
        if let Some(id) = parse_capture_id(capture_id) {
            match self.store.take_for_download(&id) {
                DownloadLookup::Active => {
                    return Err(CaptureError::Conflict(
                        "Cannot download active capture. Stop it first.".to_string(),
                    ))
                }
                DownloadLookup::Completed(session) => {
                    if self.scratch.exists(&session.file_path) {
                        info!(
                            "[{}] Sending capture file: {} ({:?})",
                            id,
                            session.file_path.display(),
                            session.state
                        );
                        return self.serve(&session.file_path).await;
                    }
                    error!(
                        "[{}] Capture file not found at expected location: {}",
                        id,
                        session.file_path.display()
                    );
                }
                DownloadLookup::Unknown => {}
            }
        }

        let file_name = file_name.filter(|f| !f.is_empty()).ok_or_else(|| {
            CaptureError::NotFound(
                "Filename not specified and capture ID not found in completed captures"
                    .to_string(),
            )
        })?;

        let not_found = || {
            CaptureError::NotFound(
                "Capture file not found. It may have been deleted or never created.".to_string(),
            )
        };

        let path = self.scratch.resolve(file_name).ok_or_else(not_found)?;
        if self.store.is_active_path(&path) {
            return Err(CaptureError::Conflict(
                "Cannot download active capture. Stop it first.".to_string(),
            ));
        }
        if !self.scratch.exists(&path) {
            error!("Requested capture file not found: {}", path.display());
            return Err(not_found());
        }

        info!("Sending capture file by name: {}", path.display());
        self.serve(&path).await
    }

    async fn serve(&self, path: &Path) -> Result<DownloadedCapture, CaptureError> {
        let contents = tokio::fs::read(path).await.map_err(|e| {
            error!("Error reading capture file {}: {}", path.display(), e);
            CaptureError::NotFound(
                "Capture file not found. It may have been deleted or never created.".to_string(),
            )
        })?;
        self.cleanup.schedule(path);

        Ok(DownloadedCapture {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            contents,
        })
    }

    pub fn list_captures(&self) -> Vec<CaptureSummary> {
        self.store.summaries()
    }

    /// Signals every active capture, cancels pending deletions and removes
    /// the scratch directory. Only the first call has any effect.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down CaptureManager");

        for active in self.store.drain_active() {
            let id = active.session.id;
            if let Some(mut process) = active.process {
                if process.is_running() {
                    info!(
                        "[{}] Stopping active capture on exit: {}",
                        id, active.session.display_name
                    );
                    if let Err(e) = process.terminate() {
                        error!("[{}] Error stopping capture on exit: {}", id, e);
                    }
                }
            }
            if let Some(drain) = active.stderr_drain {
                drain.abort();
            }
        }

        self.cleanup.cancel_all();
        self.scratch.remove_all();
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        if !self.shut_down.load(Ordering::SeqCst) {
            debug!("CaptureManager dropped without explicit shutdown");
            self.shutdown();
        }
    }
}

fn validate_interface(interface: &str) -> Result<&str, CaptureError> {
    let interface = interface.trim();
    if interface.is_empty() {
        return Err(CaptureError::Validation(
            "Interface not specified".to_string(),
        ));
    }
    if interface
        .chars()
        .any(|c| c == '/' || c == '\0' || c.is_whitespace())
    {
        return Err(CaptureError::Validation(format!(
            "Invalid interface name: {:?}",
            interface
        )));
    }
    Ok(interface)
}

fn parse_capture_id(capture_id: &str) -> Option<Uuid> {
    Uuid::parse_str(capture_id.trim()).ok()
}

/// Sends SIGTERM, waits, and escalates to a kill when the process lingers.
async fn terminate_process(id: Uuid, process: &mut dyn CaptureHandle) {
    if !process.is_running() {
        debug!("[{}] Capture process already exited", id);
        return;
    }

    if let Err(e) = process.terminate() {
        warn!("[{}] Failed to send SIGTERM: {}", id, e);
    }

    match process.wait_for_exit(TERMINATE_TIMEOUT).await {
        Ok(true) => debug!("[{}] Capture process terminated", id),
        Ok(false) => {
            warn!("[{}] {}", id, CaptureError::TimeoutForced);
            if let Err(e) = process.kill() {
                error!("[{}] Failed to kill capture process: {}", id, e);
            }
            if let Err(e) = process.wait_for_exit(TERMINATE_TIMEOUT).await {
                error!("[{}] Failed to reap capture process: {}", id, e);
            }
        }
        Err(e) => error!("[{}] Error waiting for capture process: {}", id, e),
    }
}

async fn join_stderr_drain(id: Uuid, stderr_drain: Option<JoinHandle<()>>) {
    if let Some(mut drain) = stderr_drain {
        if tokio::time::timeout(DRAIN_JOIN_TIMEOUT, &mut drain)
            .await
            .is_err()
        {
            warn!("[{}] stderr drain did not finish, aborting it", id);
            drain.abort();
        }
    }
}

/// Forwards every stderr line of the capture process to the log.
fn spawn_stderr_drain(id: Uuid, stderr: Box<dyn AsyncRead + Send + Unpin>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        error!("[{}] tcpdump error: {}", id, line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("[{}] Failed reading tcpdump stderr: {}", id, e);
                    break;
                }
            }
        }
        debug!("[{}] stderr monitoring ended", id);
    })
}
