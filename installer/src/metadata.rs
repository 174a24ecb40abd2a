//! Instance metadata access.
//!
//! The installer asks the instance metadata service for two things: the
//! region (from the instance identity document) and, when no credentials are
//! present in the environment, the instance role's temporary credentials.
//! Each lookup is a single attempt. A session token is requested first; if
//! that fails the lookups fall back to unauthenticated access.

use crate::fetch::transport::{HttpRequest, HttpTransport, TransportError};
use log::debug;
use serde::Deserialize;
use std::time::Duration;

/// Base URL of the instance metadata service.
pub const METADATA_BASE_URL: &str = "http://169.254.169.254";

/// Token lifetime requested from the metadata service, in seconds.
const TOKEN_TTL_SECONDS: &str = "21600";

const TOKEN_PATH: &str = "/latest/api/token";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const IDENTITY_DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";

/// Path listing the instance role name.
pub const ROLE_CREDENTIALS_PATH: &str = "/latest/meta-data/iam/security-credentials/";

/// Errors from instance metadata lookups.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// No response could be obtained.
    #[error("instance metadata request failed: {0}")]
    Transport(#[from] TransportError),

    /// The service answered with a non-200 status.
    #[error("bad response when getting {what}: {status}")]
    BadStatus {
        /// What was being fetched.
        what: &'static str,
        /// The status code received.
        status: u16,
    },

    /// The response body could not be interpreted.
    #[error("invalid {what}: {reason}")]
    InvalidDocument {
        /// What was being parsed.
        what: &'static str,
        /// Description of the parse failure.
        reason: String,
    },
}

/// Capability for discovering the host's region.
#[cfg_attr(test, mockall::automock)]
pub trait RegionProvider {
    /// Returns the region the host runs in, e.g. `us-east-1`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] when the region cannot be determined.
    fn region(&self) -> Result<String, MetadataError>;
}

#[derive(Deserialize)]
struct IdentityDocument {
    region: String,
}

/// Client for the instance metadata service.
pub struct InstanceMetadataClient<'a> {
    transport: &'a dyn HttpTransport,
    base_url: String,
    timeout: Duration,
}

impl<'a> InstanceMetadataClient<'a> {
    /// Creates a client against the standard metadata address.
    #[must_use]
    pub fn new(transport: &'a dyn HttpTransport, timeout: Duration) -> Self {
        Self::with_base_url(transport, METADATA_BASE_URL, timeout)
    }

    /// Creates a client against a custom base URL.
    #[must_use]
    pub fn with_base_url(
        transport: &'a dyn HttpTransport,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Request a session token; `None` means fall back to unauthenticated
    /// access.
    fn session_token(&self) -> Option<String> {
        let request = HttpRequest::put(self.url(TOKEN_PATH), self.timeout)
            .with_header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS);
        match self.transport.send(&request) {
            Ok(response) if response.status == 200 => {
                let token = String::from_utf8_lossy(&response.body).trim().to_owned();
                (!token.is_empty()).then_some(token)
            }
            Ok(response) => {
                debug!("metadata token request returned {}", response.status);
                None
            }
            Err(err) => {
                debug!("metadata token request failed: {err}");
                None
            }
        }
    }

    /// Fetch `path` once and return the body of a `200` response as text.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::BadStatus`] for any non-200 status and
    /// [`MetadataError::Transport`] when no response is received.
    pub fn get_text(&self, path: &str, what: &'static str) -> Result<String, MetadataError> {
        let mut request = HttpRequest::get(self.url(path), self.timeout);
        if let Some(token) = self.session_token() {
            request = request.with_header(TOKEN_HEADER, token);
        }
        let response = self.transport.send(&request)?;
        if response.status != 200 {
            return Err(MetadataError::BadStatus {
                what,
                status: response.status,
            });
        }
        String::from_utf8(response.body).map_err(|e| MetadataError::InvalidDocument {
            what,
            reason: e.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

impl RegionProvider for InstanceMetadataClient<'_> {
    fn region(&self) -> Result<String, MetadataError> {
        let what = "instance-identity document";
        let body = self.get_text(IDENTITY_DOCUMENT_PATH, what)?;
        let document: IdentityDocument =
            serde_json::from_str(&body).map_err(|e| MetadataError::InvalidDocument {
                what,
                reason: e.to_string(),
            })?;
        Ok(document.region)
    }
}
