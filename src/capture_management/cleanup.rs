//! Deferred deletion of served artifacts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info};
use tokio::task::JoinHandle;

/// A scheduled deletion, tagged so a finished timer only forgets itself.
struct PendingDeletion {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingMap = Mutex<HashMap<PathBuf, PendingDeletion>>;

/// One-shot timers that delete a file after a fixed delay.
///
/// At most one timer exists per path; scheduling the same path again replaces
/// the previous timer. All pending timers can be cancelled at shutdown.
pub struct CleanupScheduler {
    delay: Duration,
    next_generation: AtomicU64,
    pending: Arc<PendingMap>,
}

impl CleanupScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_generation: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules `path` for deletion. Must be called from within a tokio runtime.
    pub fn schedule(&self, path: &Path) {
        let path = path.to_path_buf();
        let delay = self.delay;
        let pending = Arc::clone(&self.pending);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // The timer removes its own entry, so spawn and insert under one lock.
        let mut guard = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match std::fs::remove_file(&task_path) {
                Ok(()) => info!("Deleted packet capture file: {}", task_path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Capture file {} already removed", task_path.display())
                }
                Err(e) => error!(
                    "Error deleting packet capture file {}: {}",
                    task_path.display(),
                    e
                ),
            }
            release(&pending, &task_path, generation);
        });
        let previous = guard.insert(path.clone(), PendingDeletion { generation, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        debug!(
            "Scheduled deletion of {} in {}s",
            path.display(),
            delay.as_secs()
        );
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Aborts every pending timer.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        if !drained.is_empty() {
            debug!("Cancelling {} pending capture deletions", drained.len());
        }
        for (_, pending) in drained {
            pending.handle.abort();
        }
    }
}

/// Drops the entry for `path` if it still belongs to timer `generation`.
fn release(pending: &PendingMap, path: &Path, generation: u64) {
    let mut guard = pending.lock().unwrap_or_else(|e| e.into_inner());
    if guard.get(path).is_some_and(|p| p.generation == generation) {
        guard.remove(path);
    }
}
