//! HTTP transport abstraction and the `ureq`-backed implementation.
//!
//! The transport performs exactly one request per call. Status codes are
//! returned as data, never as errors, so that classification stays with the
//! retry policy; only failures to obtain a response at all (DNS, TLS, connect,
//! timeout, body read) surface as [`TransportError`].

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::time::Duration;
use ureq::tls::{PemItem, RootCerts, TlsConfig, parse_pem};

/// Upper bound on a response body read into memory.
const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

/// HTTP method used by the installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`.
    Get,
    /// `PUT` with an empty body.
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Put => f.write_str("PUT"),
        }
    }
}

/// TLS trust anchors used to validate the server certificate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrustBundle {
    /// ureq's bundled WebPKI root certificates.
    #[default]
    SystemDefault,
    /// A PEM bundle on disk replacing the default roots.
    Custom(Utf8PathBuf),
}

/// A single outbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs sent verbatim.
    pub headers: Vec<(String, String)>,
    /// Certificate trust used for HTTPS.
    pub trust: TrustBundle,
    /// Per-request timeout covering connect, send, and body read.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Creates a `GET` request with no headers and default trust.
    #[must_use]
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            trust: TrustBundle::SystemDefault,
            timeout,
        }
    }

    /// Creates an empty-bodied `PUT` request with no headers.
    #[must_use]
    pub fn put(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Put,
            ..Self::get(url, timeout)
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces the header list.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the certificate trust for this request.
    #[must_use]
    pub fn with_trust(mut self, trust: TrustBundle) -> Self {
        self.trust = trust;
        self
    }
}

/// A response with its status code and fully buffered body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response from a status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failures to obtain a response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be completed.
    #[error("{method} {url} failed: {reason}")]
    Request {
        /// Request method.
        method: Method,
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The configured CA bundle could not be loaded.
    #[error("unable to load CA bundle {path}: {reason}")]
    TrustBundle {
        /// Path of the bundle.
        path: Utf8PathBuf,
        /// A human-readable description of the failure.
        reason: String,
    },
}

impl TransportError {
    /// Strips the query string from the URL carried by the error.
    ///
    /// Presigned locations carry their signature and session token in the
    /// query, so errors are redacted before they can reach a log.
    #[must_use]
    pub fn redacted(self) -> Self {
        match self {
            Self::Request {
                method,
                url,
                reason,
            } => Self::Request {
                method,
                url: redact_query(&url).to_owned(),
                reason,
            },
            other @ Self::TrustBundle { .. } => other,
        }
    }
}

/// Returns `url` without its query string.
///
/// # Examples
///
/// ```
/// use chronicle_installer::fetch::transport::redact_query;
///
/// assert_eq!(
///     redact_query("https://bucket.example/chronicled.rpm?X-Amz-Signature=abc"),
///     "https://bucket.example/chronicled.rpm"
/// );
/// ```
#[must_use]
pub fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Trait for sending one HTTP request.
///
/// Abstractions allow tests to script responses without network access.
#[cfg_attr(test, mockall::automock)]
pub trait HttpTransport {
    /// Sends `request` and returns the response whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response could be obtained.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// HTTP transport using `ureq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransport;

impl HttpTransport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = agent_for(request)?;
        let request_error = |reason: String| TransportError::Request {
            method: request.method,
            url: redact_query(&request.url).to_owned(),
            reason,
        };

        let result = match request.method {
            Method::Get => {
                let mut builder = agent.get(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            Method::Put => {
                let mut builder = agent.put(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.send_empty()
            }
        };
        let response = result.map_err(|e| request_error(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .into_body()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
            .map_err(|e| request_error(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

/// Build an agent honouring the request's timeout and trust settings.
///
/// Status codes are not turned into errors; the caller classifies them.
fn agent_for(request: &HttpRequest) -> Result<ureq::Agent, TransportError> {
    let builder = ureq::Agent::config_builder()
        .timeout_global(Some(request.timeout))
        .http_status_as_error(false);
    let config = match &request.trust {
        TrustBundle::SystemDefault => builder.build(),
        TrustBundle::Custom(path) => builder.tls_config(custom_tls(path)?).build(),
    };
    Ok(ureq::Agent::new_with_config(config))
}

/// Load every certificate from a PEM bundle as the only trusted roots.
fn custom_tls(path: &Utf8Path) -> Result<TlsConfig, TransportError> {
    let bundle_error = |reason: String| TransportError::TrustBundle {
        path: path.to_owned(),
        reason,
    };
    let pem = std::fs::read(path).map_err(|e| bundle_error(e.to_string()))?;
    let certs: Vec<_> = parse_pem(&pem)
        .filter_map(|item| match item {
            Ok(PemItem::Certificate(cert)) => Some(cert.to_owned()),
            _ => None,
        })
        .collect();
    if certs.is_empty() {
        return Err(bundle_error("no certificates found".to_owned()));
    }
    Ok(TlsConfig::builder()
        .root_certs(RootCerts::new_with_certs(&certs))
        .build())
}
