//! Stale package-database lock recovery.
//!
//! A package-manager process killed mid-transaction can leave Berkeley DB
//! environment files behind, after which every query fails with a
//! "thread died" error. This module recognises that signature and clears
//! the `__db*` scratch files, but only after two checks, separated by a
//! pause, confirm that no root-owned process holds the database open.

use crate::clock::Sleeper;
use crate::executor::{CommandExecutor, combined_output};
use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use std::fs;
use std::io;
use std::time::Duration;

/// Default package database directory.
pub const DEFAULT_RPM_DB_DIR: &str = "/var/lib/rpm";

/// File-name prefix of the database's lock-scratch files.
pub const STALE_LOCK_PREFIX: &str = "__db";

/// Output fragment identifying a stale database lock.
pub const STALE_LOCK_SIGNATURE: &str = "Thread died in Berkeley DB library";

/// Pause between the two holder checks.
pub const RECHECK_DELAY: Duration = Duration::from_secs(20);

/// `fuser -u` annotates each accessing process with its owner.
const ROOT_HOLDER_MARKER: &str = "(root)";

/// Errors from checking or repairing the package database.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The health query could not be run.
    #[error("unable to run rpm: {reason}")]
    Query {
        /// Description of the spawn failure.
        reason: String,
    },

    /// The health query failed for a reason other than a stale lock.
    #[error("error calling rpm: {output}")]
    Database {
        /// Package-manager output.
        output: String,
    },

    /// A root process still holds the database after the re-check.
    #[error("error calling rpm: {output} (database still held by a root process)")]
    Held {
        /// The health query output that revealed the stale lock.
        output: String,
    },

    /// The holder check itself could not be run.
    #[error("unable to check for processes holding {dir}: {reason}")]
    HolderCheck {
        /// The database directory.
        dir: Utf8PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// A stale lock file could not be removed.
    #[error("failed to remove stale lock file {path}: {source}")]
    Cleanup {
        /// The file being removed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// The result of a successful database check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// The health query succeeded; nothing was touched.
    Healthy,
    /// A stale lock was cleared by removing these files.
    Repaired {
        /// Removed scratch files, in name order.
        removed: Vec<Utf8PathBuf>,
    },
}

/// Detects and repairs a stale package-database lock.
pub struct LockRecovery<'a> {
    executor: &'a dyn CommandExecutor,
    sleeper: &'a dyn Sleeper,
    db_dir: Utf8PathBuf,
    recheck_delay: Duration,
}

impl<'a> LockRecovery<'a> {
    /// Creates a recovery helper for the database in `db_dir`.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        sleeper: &'a dyn Sleeper,
        db_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            executor,
            sleeper,
            db_dir: db_dir.into(),
            recheck_delay: RECHECK_DELAY,
        }
    }

    /// Overrides the pause between holder checks.
    #[must_use]
    pub fn with_recheck_delay(mut self, delay: Duration) -> Self {
        self.recheck_delay = delay;
        self
    }

    /// Ensures the package database answers queries, clearing a stale lock
    /// when it is safe to do so.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Database`] for unrecognised health query failures and
    /// [`LockError::Held`] when a root process holds the database on both
    /// checks. Nothing is deleted in either case.
    pub fn ensure_usable(&self) -> Result<LockOutcome, LockError> {
        let health = self
            .executor
            .run("rpm", &["-q", "rpm"])
            .map_err(|err| LockError::Query {
                reason: err.to_string(),
            })?;
        if health.status.success() {
            return Ok(LockOutcome::Healthy);
        }
        let output = combined_output(&health);
        if !output.contains(STALE_LOCK_SIGNATURE) {
            return Err(LockError::Database { output });
        }

        warn!("package database at {} has a stale lock", self.db_dir);
        if self.held_by_root()? {
            info!(
                "database is in use; checking again in {}s",
                self.recheck_delay.as_secs()
            );
            self.sleeper.sleep(self.recheck_delay);
            if self.held_by_root()? {
                return Err(LockError::Held { output });
            }
        }

        let removed = self.remove_stale_files()?;
        info!("removed {} stale lock file(s)", removed.len());
        Ok(LockOutcome::Repaired { removed })
    }

    fn database_files(&self) -> Result<Vec<Utf8PathBuf>, LockError> {
        let entries = fs::read_dir(&self.db_dir).map_err(|err| LockError::HolderCheck {
            dir: self.db_dir.clone(),
            reason: err.to_string(),
        })?;
        let mut files: Vec<Utf8PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
            .collect();
        files.sort();
        Ok(files)
    }

    fn held_by_root(&self) -> Result<bool, LockError> {
        let files = self.database_files()?;
        if files.is_empty() {
            return Ok(false);
        }
        let mut args = vec!["-u"];
        args.extend(files.iter().map(|path| path.as_str()));
        // fuser exits non-zero when nothing is accessing the files, so only
        // its annotations matter.
        let output = self
            .executor
            .run("fuser", &args)
            .map_err(|err| LockError::HolderCheck {
                dir: self.db_dir.clone(),
                reason: err.to_string(),
            })?;
        Ok(combined_output(&output).contains(ROOT_HOLDER_MARKER))
    }

    fn remove_stale_files(&self) -> Result<Vec<Utf8PathBuf>, LockError> {
        let stale: Vec<Utf8PathBuf> = self
            .database_files()?
            .into_iter()
            .filter(|path| is_stale_lock_file(path))
            .collect();
        for path in &stale {
            fs::remove_file(path).map_err(|source| LockError::Cleanup {
                path: path.clone(),
                source,
            })?;
        }
        Ok(stale)
    }
}

fn is_stale_lock_file(path: &Utf8Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.starts_with(STALE_LOCK_PREFIX))
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
