//! Lock-guarded registry of active and completed capture sessions.
//!
//! Both maps sit behind a single mutex so that moving a session from active
//! to completed is one critical section: an id is never visible in both maps
//! and never disappears from both while a stop is in flight.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::capture_engine::CaptureHandle;
use super::types::{CaptureSession, CaptureSummary};
use super::SessionState;

/// An active session together with the resources it owns.
pub struct ActiveCapture {
    pub session: CaptureSession,
    /// `None` once a stop request has taken the process.
    pub process: Option<Box<dyn CaptureHandle>>,
    /// Task draining the process' stderr into the log.
    pub stderr_drain: Option<JoinHandle<()>>,
}

/// Outcome of looking up an id for download.
#[derive(Debug)]
pub enum DownloadLookup {
    Active,
    Completed(CaptureSession),
    Unknown,
}

/// Outcome of claiming an active session for stopping.
pub enum StopClaim {
    Claimed {
        process: Box<dyn CaptureHandle>,
        stderr_drain: Option<JoinHandle<()>>,
    },
    AlreadyStopping,
    Unknown,
}

#[derive(Default)]
struct Registry {
    active: HashMap<Uuid, ActiveCapture>,
    completed: HashMap<Uuid, CaptureSession>,
}

#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<Registry>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_active(&self, active: ActiveCapture) {
        let id = active.session.id;
        self.lock().active.insert(id, active);
    }

    pub fn is_active(&self, id: &Uuid) -> bool {
        self.lock().active.contains_key(id)
    }

    /// Whether an active session is still writing to `path`.
    pub fn is_active_path(&self, path: &Path) -> bool {
        self.lock()
            .active
            .values()
            .any(|a| a.session.file_path == path)
    }

    pub fn is_completed(&self, id: &Uuid) -> bool {
        self.lock().completed.contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn completed_count(&self) -> usize {
        self.lock().completed.len()
    }

    /// Takes the process out of an active session, leaving the entry in place.
    pub fn claim_for_stop(&self, id: &Uuid) -> StopClaim {
        let mut registry = self.lock();
        match registry.active.get_mut(id) {
            None => StopClaim::Unknown,
            Some(active) => match active.process.take() {
                Some(process) => StopClaim::Claimed {
                    process,
                    stderr_drain: active.stderr_drain.take(),
                },
                None => StopClaim::AlreadyStopping,
            },
        }
    }

    /// Moves a session from active to completed, marking it `Stopped`.
    pub fn complete(&self, id: &Uuid) -> Option<CaptureSession> {
        let mut registry = self.lock();
        let active = registry.active.remove(id)?;
        let mut session = active.session;
        session.state = SessionState::Stopped;
        session.stopped_at = Some(Utc::now());
        registry.completed.insert(session.id, session.clone());
        Some(session)
    }

    /// Classifies `id` and, when completed, removes it in the same critical
    /// section. The returned session is marked `Downloaded`.
    pub fn take_for_download(&self, id: &Uuid) -> DownloadLookup {
        let mut registry = self.lock();
        if registry.active.contains_key(id) {
            return DownloadLookup::Active;
        }
        match registry.completed.remove(id) {
            Some(mut session) => {
                session.state = SessionState::Downloaded;
                DownloadLookup::Completed(session)
            }
            None => DownloadLookup::Unknown,
        }
    }

    /// Empties the active map, handing back everything it owned.
    pub fn drain_active(&self) -> Vec<ActiveCapture> {
        self.lock().active.drain().map(|(_, a)| a).collect()
    }

    /// Active sessions first, then completed ones, each ordered by start time.
    pub fn summaries(&self) -> Vec<CaptureSummary> {
        let registry = self.lock();
        let mut active: Vec<_> = registry.active.values().map(|a| &a.session).collect();
        let mut completed: Vec<_> = registry.completed.values().collect();
        active.sort_by_key(|s| s.started_at);
        completed.sort_by_key(|s| s.started_at);
        active
            .into_iter()
            .chain(completed)
            .map(CaptureSession::summary)
            .collect()
    }
}
