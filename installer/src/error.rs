//! Top-level error type for a provisioning run.
//!
//! Component errors keep their own types; this module folds them into one
//! [`ProvisionError`] whose variants follow the failure taxonomy the driver
//! reports on: credentials, network, HTTP status, trust, lock, install, and
//! the local concerns around them (metadata, staging, configuration, I/O).

use crate::artefact::download::{DownloadError, DownloadStage};
use crate::artefact::staging::StagingError;
use crate::config::ConfigError;
use crate::fetch::transport::TransportError;
use crate::lock::LockError;
use crate::metadata::MetadataError;
use crate::reconcile::InstallError;
use crate::signing::SigningError;
use crate::signing::credentials::CredentialError;
use crate::trust::TrustError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that end a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Settings could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The staging directory could not be prepared.
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// No ambient credentials were available.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The instance metadata service could not supply the region.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// No response was received after exhausting retries.
    #[error("request for {stage} failed: {source}")]
    Network {
        /// Which download request failed.
        stage: DownloadStage,
        /// The final transport error.
        #[source]
        source: TransportError,
    },

    /// The final response carried a non-200 status.
    #[error("bad response when getting {stage}: {status}")]
    Http {
        /// Which download request failed.
        stage: DownloadStage,
        /// The status code received.
        status: u16,
    },

    /// The download could not be completed for a local reason.
    #[error("download failed: {reason}")]
    Download {
        /// Description of the failure.
        reason: String,
    },

    /// The staged package failed verification.
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// The package database is unusable.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Installation failed.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// The staged package could not be removed at the end of the run.
    #[error("failed to remove staged package {path}: {source}")]
    Cleanup {
        /// The staged package path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The host could not be inspected.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DownloadError> for ProvisionError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Region(source) => Self::Metadata(source),
            DownloadError::Signing(SigningError::Credential(source)) => Self::Credential(source),
            DownloadError::Transport { stage, source } => Self::Network { stage, source },
            DownloadError::BadStatus { stage, status } => Self::Http { stage, status },
            other @ (DownloadError::Signing(_)
            | DownloadError::InvalidLocation { .. }
            | DownloadError::Io { .. }) => Self::Download {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias using [`ProvisionError`].
pub type Result<T> = std::result::Result<T, ProvisionError>;
