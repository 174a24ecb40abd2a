//! Staging directory and downloaded-artefact lifetime.
//!
//! A run stages at most one package file and one key file inside a private
//! directory. The package file is owned by a [`StagingArtefact`] guard that
//! removes it when dropped, so every exit path leaves the staging directory
//! without an unverified package in it.

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;

/// Default staging directory.
pub const DEFAULT_STAGING_DIR: &str = "/usr/local/chronicle";

/// File name of the downloaded package within the staging directory.
pub const ARTEFACT_FILE_NAME: &str = "chronicled.rpm";

/// File name of the exported signing key within the staging directory.
pub const KEY_FILE_NAME: &str = "public_key";

/// Permission bits applied to the staging directory.
pub const STAGING_DIR_MODE: u32 = 0o700;

/// Errors from preparing the staging directory.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// The directory could not be created.
    #[error("failed to create staging directory {path}: {source}")]
    Create {
        /// The directory being created.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The directory exists but its permissions could not be restricted.
    #[error("failed to restrict permissions on {path}: {source}")]
    Permissions {
        /// The directory being updated.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A non-directory occupies the staging path.
    #[error("staging path {path} exists and is not a directory")]
    NotADirectory {
        /// The offending path.
        path: Utf8PathBuf,
    },
}

/// Paths used by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    dir: Utf8PathBuf,
    artefact_path: Utf8PathBuf,
    key_path: Utf8PathBuf,
}

impl Default for StagingLayout {
    fn default() -> Self {
        Self::new(DEFAULT_STAGING_DIR)
    }
}

impl StagingLayout {
    /// Creates the layout rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            artefact_path: dir.join(ARTEFACT_FILE_NAME),
            key_path: dir.join(KEY_FILE_NAME),
            dir,
        }
    }

    /// Returns the staging directory.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Returns where the downloaded package is written.
    #[must_use]
    pub fn artefact_path(&self) -> &Utf8Path {
        &self.artefact_path
    }

    /// Returns where the signing key is written before import.
    #[must_use]
    pub fn key_path(&self) -> &Utf8Path {
        &self.key_path
    }

    /// Creates the staging directory with mode `0700`, or restricts an
    /// existing one to that mode.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError`] when the directory cannot be created or
    /// its permissions cannot be changed.
    pub fn ensure(&self) -> Result<(), StagingError> {
        match fs::metadata(&self.dir) {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(StagingError::NotADirectory {
                    path: self.dir.clone(),
                });
            }
            Ok(_) => debug!("staging directory {} already exists", self.dir),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.dir).map_err(|source| StagingError::Create {
                    path: self.dir.clone(),
                    source,
                })?;
            }
            Err(source) => {
                return Err(StagingError::Create {
                    path: self.dir.clone(),
                    source,
                });
            }
        }
        fs::set_permissions(&self.dir, fs::Permissions::from_mode(STAGING_DIR_MODE)).map_err(
            |source| StagingError::Permissions {
                path: self.dir.clone(),
                source,
            },
        )
    }

    /// Writes `bytes` to the artefact path and returns the owning guard.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from writing the file. A partially written
    /// file is removed before returning.
    pub fn stage_artefact(&self, bytes: &[u8]) -> io::Result<StagingArtefact> {
        let artefact = StagingArtefact {
            path: self.artefact_path.clone(),
            armed: true,
        };
        fs::write(&artefact.path, bytes)?;
        Ok(artefact)
    }
}

/// A downloaded package file owned by the current run.
///
/// Dropping the guard removes the file. [`StagingArtefact::cleanup`] does the
/// same explicitly and reports failures to the caller.
#[derive(Debug)]
pub struct StagingArtefact {
    path: Utf8PathBuf,
    armed: bool,
}

impl StagingArtefact {
    /// Returns the path of the staged file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Removes the staged file now.
    ///
    /// A file that is already gone counts as removed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from removing the file.
    pub fn cleanup(mut self) -> io::Result<()> {
        self.armed = false;
        remove_if_present(&self.path)
    }
}

impl Drop for StagingArtefact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        if let Err(err) = remove_if_present(&self.path) {
            warn!("failed to remove staged artefact {}: {err}", self.path);
        }
    }
}

/// Remove `path`, treating a missing file as success.
pub(crate) fn remove_if_present(path: &Utf8Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("removed {path}");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
