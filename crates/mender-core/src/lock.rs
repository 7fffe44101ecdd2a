//! Execution lock: at most one live scheduler run per host.
//!
//! The lock is a marker file at a well-known path, published with a hard link
//! so only one process can win. It records the holder's pid, a per-acquisition
//! token and the acquisition time.
//!
//! # How It Works
//!
//! 1. `acquire` writes the marker to a staging file, then hard-links it into
//!    place; the link fails if a marker already exists, and a half-written
//!    marker is never visible at the well-known path
//! 2. If it exists, `Blocking` mode polls until it disappears; `Bounded` mode
//!    gives up with `AlreadyLocked` after the timeout
//! 3. The returned `LockHandle` deletes the marker on `release()` or on drop
//! 4. A marker whose holder died, or one that cannot be parsed, is reported
//!    but never removed automatically; an operator runs `reclaim_stale()`

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::ports::{Clock, SystemClock};

/// Contents of the marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMarker {
    pub pid: u32,

    /// Unique per acquisition; guards against releasing someone else's lock
    /// after pid reuse.
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("execution lock {path} is held by pid {pid:?} since {acquired_at:?}")]
    AlreadyLocked {
        path: String,
        pid: Option<u32>,
        acquired_at: Option<DateTime<Utc>>,
    },

    #[error("execution lock {path} now belongs to pid {found_pid} (token {found_token}); not removing it")]
    OwnershipMismatch {
        path: String,
        found_pid: u32,
        found_token: String,
    },

    #[error("lock marker {path} is unreadable: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("lock I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// How `acquire` behaves when the lock is already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Wait until the holder releases.
    Blocking,

    /// Wait at most this long, then fail with `AlreadyLocked`.
    Bounded(Duration),

    /// Do not lock at all (local testing only).
    Bypass,
}

/// Diagnostic view of the current marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub marker: LockMarker,

    /// Time since acquisition, in whole seconds.
    pub age_secs: i64,

    /// False when the holder process is known to be gone.
    pub holder_alive: bool,
}

impl LockStatus {
    pub fn is_stale(&self) -> bool {
        !self.holder_alive
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimOutcome {
    NotLocked,
    HolderAlive(LockStatus),
    Reclaimed(LockStatus),
    /// The marker could not be parsed, so no holder could be named.
    RemovedCorrupt { reason: String },
}

/// Creates and inspects the execution lock marker.
#[derive(Clone)]
pub struct LockManager {
    path: PathBuf,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("path", &self.path)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl LockManager {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock according to `mode`.
    ///
    /// # Errors
    ///
    /// `AlreadyLocked` when a bounded wait times out; `Io` when the marker
    /// cannot be created for any reason other than already existing.
    pub async fn acquire(&self, mode: AcquireMode) -> Result<LockHandle, LockError> {
        let deadline = match mode {
            AcquireMode::Bypass => {
                tracing::warn!(path = %self.path.display(), "execution lock bypassed");
                return Ok(LockHandle::bypassed());
            }
            AcquireMode::Blocking => None,
            AcquireMode::Bounded(timeout) => Some(tokio::time::Instant::now() + timeout),
        };

        let mut announced = false;
        loop {
            if let Some(handle) = self.try_acquire()? {
                return Ok(handle);
            }

            if !announced {
                announced = true;
                match self.inspect() {
                    Ok(Some(s)) if s.is_stale() => tracing::warn!(
                        path = %self.path.display(),
                        pid = s.marker.pid,
                        "an operator must reclaim the stale execution lock"
                    ),
                    Ok(Some(s)) => tracing::info!(
                        path = %self.path.display(),
                        pid = s.marker.pid,
                        age_secs = s.age_secs,
                        "execution lock held; waiting for release"
                    ),
                    Ok(None) => tracing::info!(
                        path = %self.path.display(),
                        "execution lock held; waiting for release"
                    ),
                    Err(e) => tracing::warn!(
                        error = %e,
                        "execution lock marker is unreadable; an operator must reclaim it"
                    ),
                }
            }

            let mut sleep_for = self.poll_interval;
            if let Some(deadline) = deadline {
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    let status = self.inspect().ok().flatten();
                    return Err(LockError::AlreadyLocked {
                        path: self.path.display().to_string(),
                        pid: status.as_ref().map(|s| s.marker.pid),
                        acquired_at: status.as_ref().map(|s| s.marker.acquired_at),
                    });
                }
                sleep_for = sleep_for.min(deadline - now);
            }
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// One non-blocking attempt. `Ok(None)` means someone else holds it.
    pub fn try_acquire(&self) -> Result<Option<LockHandle>, LockError> {
        let marker = LockMarker {
            pid: std::process::id(),
            token: Ulid::new().to_string(),
            hostname: hostname(),
            acquired_at: self.clock.now(),
        };

        let body = serde_json::to_vec_pretty(&marker).map_err(|e| LockError::Corrupt {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        let staging = self.staging_path(&marker.token);
        if let Err(source) = write_synced(&staging, &body) {
            let _ = std::fs::remove_file(&staging);
            return Err(self.io_error(source));
        }
        // hard_link は既存のパスを上書きしないので create_new と同じく排他的
        let linked = std::fs::hard_link(&staging, &self.path);
        let _ = std::fs::remove_file(&staging);
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        }

        tracing::debug!(path = %self.path.display(), pid = marker.pid, "execution lock acquired");
        Ok(Some(LockHandle {
            path: Some(self.path.clone()),
            token: marker.token,
            released: false,
        }))
    }

    /// Read the marker without touching it. `Ok(None)` means unlocked.
    pub fn inspect(&self) -> Result<Option<LockStatus>, LockError> {
        let Some(marker) = read_marker(&self.path)? else {
            return Ok(None);
        };
        let age_secs = (self.clock.now() - marker.acquired_at).num_seconds();
        let holder_alive = holder_alive(&marker);
        if !holder_alive {
            tracing::warn!(
                path = %self.path.display(),
                pid = marker.pid,
                age_secs,
                "stale execution lock: holder process is gone"
            );
        }
        Ok(Some(LockStatus {
            marker,
            age_secs,
            holder_alive,
        }))
    }

    /// Remove the marker only if its holder is gone, or if it cannot be
    /// parsed at all. Operator action.
    pub fn reclaim_stale(&self) -> Result<ReclaimOutcome, LockError> {
        let status = match self.inspect() {
            Ok(Some(status)) => status,
            Ok(None) => return Ok(ReclaimOutcome::NotLocked),
            Err(LockError::Corrupt { reason, .. }) => {
                self.remove_marker()?;
                tracing::warn!(path = %self.path.display(), %reason, "unreadable execution lock marker removed");
                return Ok(ReclaimOutcome::RemovedCorrupt { reason });
            }
            Err(e) => return Err(e),
        };
        if status.holder_alive {
            return Ok(ReclaimOutcome::HolderAlive(status));
        }
        self.remove_marker()?;
        tracing::info!(path = %self.path.display(), pid = status.marker.pid, "stale execution lock reclaimed");
        Ok(ReclaimOutcome::Reclaimed(status))
    }

    fn remove_marker(&self) -> Result<(), LockError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    /// Sibling of the marker, unique per acquisition attempt.
    fn staging_path(&self, token: &str) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "lock".to_string());
        self.path.with_file_name(format!(".{name}.{token}.tmp"))
    }

    fn io_error(&self, source: std::io::Error) -> LockError {
        LockError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// Proof of holding the execution lock.
///
/// Released exactly once: by `release()`, or by `Drop` on every other exit path.
#[derive(Debug)]
#[must_use = "dropping the handle releases the lock"]
pub struct LockHandle {
    path: Option<PathBuf>,
    token: String,
    released: bool,
}

impl LockHandle {
    fn bypassed() -> Self {
        Self {
            path: None,
            token: String::new(),
            released: false,
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.path.is_none()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Remove the marker.
    ///
    /// A missing marker is fine (already released). A marker with another
    /// token is left alone and reported as `OwnershipMismatch`.
    pub fn release(mut self) -> Result<(), LockError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), LockError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let Some(path) = &self.path else {
            return Ok(());
        };
        let Some(marker) = read_marker(path)? else {
            return Ok(());
        };
        if marker.token != self.token {
            return Err(LockError::OwnershipMismatch {
                path: path.display().to_string(),
                found_pid: marker.pid,
                found_token: marker.token,
            });
        }
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(LockError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        }
        tracing::debug!(path = %path.display(), "execution lock released");
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::warn!(error = %e, "failed to release execution lock");
        }
    }
}

fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(body)?;
    file.sync_all()
}

fn read_marker(path: &Path) -> Result<Option<LockMarker>, LockError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LockError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| LockError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Whether the marker's holder may still be running.
///
/// Markers from another host cannot be checked and count as alive.
fn holder_alive(marker: &LockMarker) -> bool {
    match (&marker.hostname, hostname()) {
        (Some(theirs), Some(ours)) if *theirs != ours => true,
        _ => process_alive(marker.pid),
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // kill(pid, 0) checks existence without sending a signal.
    // EPERM means the process exists but belongs to someone else.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..end].to_vec()).ok()
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    None
}
