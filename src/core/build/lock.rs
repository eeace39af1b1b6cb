//! Build lock
//!
//! A lock file next to the raw snapshot keeps two builds from running
//! against it at once. The file is removed when the guard is dropped; a
//! lock left by a build that died without dropping it is taken over once its
//! process is gone or it has outlived the stale age.

use crate::domain::{CorridorError, Result};
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const LOCK_FILE: &str = ".corridor-build.lock";

/// Contents of a lock file: `pid=<pid> started_at=<rfc3339>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl LockHolder {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    /// Parses a lock file body; `None` if it is empty or malformed
    pub fn parse(contents: &str) -> Option<Self> {
        let mut pid = None;
        let mut started_at = None;
        for field in contents.split_whitespace() {
            match field.split_once('=') {
                Some(("pid", value)) => pid = value.parse().ok(),
                Some(("started_at", value)) => {
                    started_at = DateTime::parse_from_rfc3339(value)
                        .ok()
                        .map(|t| t.with_timezone(&Utc));
                }
                _ => {}
            }
        }
        Some(Self {
            pid: pid?,
            started_at: started_at?,
        })
    }

    /// True when the holder can no longer be running a build
    fn is_stale(&self, stale_after: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.started_at);
        let expired = age.to_std().map(|age| age > stale_after).unwrap_or(false);
        expired || process_gone(self.pid)
    }
}

impl std::fmt::Display for LockHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid={} started_at={}", self.pid, self.started_at.to_rfc3339())
    }
}

#[cfg(target_os = "linux")]
fn process_gone(pid: u32) -> bool {
    !Path::new("/proc").join(pid.to_string()).exists()
}

// Without procfs only the age decides
#[cfg(not(target_os = "linux"))]
fn process_gone(_pid: u32) -> bool {
    false
}

#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    /// Takes the lock for `raw_dir`
    ///
    /// # Errors
    ///
    /// Returns [`CorridorError::BuildInProgress`] if a live build holds it.
    pub fn acquire(raw_dir: &Path, stale_after: Duration) -> Result<Self> {
        std::fs::create_dir_all(raw_dir)?;
        let path = raw_dir.join(LOCK_FILE);

        match Self::create(&path) {
            Err(CorridorError::BuildInProgress(_)) if Self::reclaim(&path, stale_after)? => {
                Self::create(&path)
            }
            result => result,
        }
    }

    fn create(path: &Path) -> Result<Self> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(path).unwrap_or_default();
                return Err(CorridorError::BuildInProgress(format!(
                    "{} is held ({})",
                    path.display(),
                    holder.trim()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", LockHolder::current())?;

        tracing::debug!(path = %path.display(), "Build lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Removes the lock file if its holder is stale; true if it was removed
    fn reclaim(path: &Path, stale_after: Duration) -> Result<bool> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            // Released between our attempt and this read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        // A malformed lock is only trusted for as long as a live one would be
        let stale = match LockHolder::parse(&contents) {
            Some(holder) => holder.is_stale(stale_after, Utc::now()),
            None => std::fs::metadata(path)?
                .modified()?
                .elapsed()
                .map(|age| age > stale_after)
                .unwrap_or(false),
        };
        if !stale {
            return Ok(false);
        }

        tracing::warn!(
            path = %path.display(),
            holder = %contents.trim(),
            "Reclaiming stale build lock"
        );
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release build lock");
        }
    }
}
