//! Package retrieval through the control plane.
//!
//! Downloading is a two-step exchange. A signed request to the regional
//! control endpoint returns a presigned location as its body; fetching that
//! location returns the package bytes, which are written to the staging path.
//! Both requests share the region's certificate trust and the fetcher's
//! retry budget. A non-200 final response from either is fatal.

use crate::artefact::reference::ArtefactReference;
use crate::artefact::staging::{StagingArtefact, StagingLayout};
use crate::endpoint::EndpointResolver;
use crate::fetch::RetryingFetcher;
use crate::fetch::transport::{HttpRequest, TransportError};
use crate::metadata::{MetadataError, RegionProvider};
use crate::signing::credentials::CredentialsProvider;
use crate::signing::{RequestSigner, SigningError};
use camino::Utf8PathBuf;
use log::{debug, info};
use std::fmt;
use std::io;
use std::time::Duration;

/// Default per-request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Which of the two download requests failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStage {
    /// The signed request for a presigned location.
    Location,
    /// The request for the package bytes.
    Contents,
}

impl fmt::Display for DownloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location => f.write_str("RPM url"),
            Self::Contents => f.write_str("RPM contents"),
        }
    }
}

/// Errors arising while downloading the package.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The host region could not be determined.
    #[error("unable to determine region: {0}")]
    Region(#[from] MetadataError),

    /// The control-plane request could not be signed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// No response was received after exhausting retries.
    #[error("request for {stage} failed: {source}")]
    Transport {
        /// Which request failed.
        stage: DownloadStage,
        /// The final transport error.
        #[source]
        source: TransportError,
    },

    /// The final response carried a non-200 status.
    #[error("bad response when getting {stage}: {status}")]
    BadStatus {
        /// Which request failed.
        stage: DownloadStage,
        /// The status code received.
        status: u16,
    },

    /// The control plane returned an unusable presigned location.
    #[error("invalid presigned location: {reason}")]
    InvalidLocation {
        /// Why the location was rejected.
        reason: String,
    },

    /// The package could not be written to the staging path.
    #[error("failed to write {path}: {source}")]
    Io {
        /// The staging path being written.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Capability for placing the package at the staging path.
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactDownloader {
    /// Downloads `reference` into `layout` and returns the owning guard.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for any failure; the staging path is left
    /// without a package file in that case.
    fn download(
        &self,
        reference: &ArtefactReference,
        layout: &StagingLayout,
    ) -> Result<StagingArtefact, DownloadError>;
}

/// Downloads the package through the regional control plane.
pub struct ControlPlaneDownloader<'a> {
    region: &'a dyn RegionProvider,
    signer: RequestSigner<'a>,
    fetcher: &'a RetryingFetcher<'a>,
    resolver: EndpointResolver,
    timeout: Duration,
}

impl<'a> ControlPlaneDownloader<'a> {
    /// Creates a downloader from its collaborators.
    #[must_use]
    pub fn new(
        region: &'a dyn RegionProvider,
        credentials: &'a dyn CredentialsProvider,
        fetcher: &'a RetryingFetcher<'a>,
        timeout: Duration,
    ) -> Self {
        Self {
            region,
            signer: RequestSigner::new(credentials),
            fetcher,
            resolver: EndpointResolver,
            timeout,
        }
    }

    fn presigned_location(body: Vec<u8>) -> Result<String, DownloadError> {
        let text = String::from_utf8(body).map_err(|e| DownloadError::InvalidLocation {
            reason: e.to_string(),
        })?;
        let location = text.trim();
        if location.is_empty() {
            return Err(DownloadError::InvalidLocation {
                reason: "response body is empty".to_owned(),
            });
        }
        Ok(location.to_owned())
    }

    fn fetch_ok(
        &self,
        request: &HttpRequest,
        stage: DownloadStage,
    ) -> Result<Vec<u8>, DownloadError> {
        let result = self
            .fetcher
            .fetch(request)
            .map_err(|source| DownloadError::Transport { stage, source })?;
        if !result.is_success() {
            return Err(DownloadError::BadStatus {
                stage,
                status: result.status(),
            });
        }
        Ok(result.into_body())
    }
}

impl ArtefactDownloader for ControlPlaneDownloader<'_> {
    fn download(
        &self,
        reference: &ArtefactReference,
        layout: &StagingLayout,
    ) -> Result<StagingArtefact, DownloadError> {
        let region = self.region.region()?;
        let endpoint = self.resolver.resolve(&region);
        info!(
            "requesting {reference} from {} ({} partition)",
            endpoint.base_url(),
            endpoint.partition()
        );

        let url = endpoint.rpm_url(&reference.request_component());
        let signed = self.signer.sign("GET", &url, &region)?;
        let request = HttpRequest::get(url, self.timeout)
            .with_headers(signed.into_headers())
            .with_trust(endpoint.trust().clone());
        let body = self.fetch_ok(&request, DownloadStage::Location)?;
        let location = Self::presigned_location(body)?;
        debug!("received presigned location");

        let request = HttpRequest::get(location, self.timeout).with_trust(endpoint.trust().clone());
        let bytes = self.fetch_ok(&request, DownloadStage::Contents)?;
        let artefact = layout
            .stage_artefact(&bytes)
            .map_err(|source| DownloadError::Io {
                path: layout.artefact_path().to_owned(),
                source,
            })?;
        info!("downloaded {} bytes to {}", bytes.len(), artefact.path());
        Ok(artefact)
    }
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;
