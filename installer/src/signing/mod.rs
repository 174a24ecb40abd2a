//! AWS Signature Version 4 request signing.
//!
//! The control endpoint authenticates callers with SigV4 scoped to the
//! collection service and the caller's region. Only bodiless `GET` requests
//! are signed, so the payload hash is always that of the empty string.
//!
//! # Sub-modules
//!
//! - [`credentials`] - Ambient credential providers.

pub mod credentials;

use chrono::{DateTime, Utc};
use credentials::{CredentialError, Credentials, CredentialsProvider};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use ureq::http::Uri;

/// The service name the control endpoint signs against.
pub const SIGNING_SERVICE: &str = "aws-chronicle-collection";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const TERMINATOR: &str = "aws4_request";

/// SHA-256 of the empty payload.
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

type HmacSha256 = Hmac<Sha256>;

/// Errors raised while signing a request.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// No credentials were available to sign with.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The URL could not be parsed into host and path.
    #[error("cannot sign {url}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// The HMAC could not be keyed.
    #[error("invalid signing key: {reason}")]
    InvalidKey {
        /// Description of the key failure.
        reason: String,
    },
}

/// A request carrying SigV4 authentication headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    signature: String,
}

impl SignedRequest {
    /// Returns the HTTP method that was signed.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the URL that was signed.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the headers to send: `X-Amz-Date`, the optional
    /// `X-Amz-Security-Token`, and `Authorization`.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the hex-encoded signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Consumes the request and returns its headers.
    #[must_use]
    pub fn into_headers(self) -> Vec<(String, String)> {
        self.headers
    }
}

/// Signs requests with credentials from a [`CredentialsProvider`].
pub struct RequestSigner<'a> {
    credentials: &'a dyn CredentialsProvider,
    service: String,
}

impl<'a> RequestSigner<'a> {
    /// Creates a signer for [`SIGNING_SERVICE`].
    #[must_use]
    pub fn new(credentials: &'a dyn CredentialsProvider) -> Self {
        Self::for_service(credentials, SIGNING_SERVICE)
    }

    /// Creates a signer for an arbitrary service name.
    #[must_use]
    pub fn for_service(
        credentials: &'a dyn CredentialsProvider,
        service: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            service: service.into(),
        }
    }

    /// Signs `method url` for `region` at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Credential`] when no credentials are available
    /// and [`SigningError::InvalidUrl`] for URLs without a host.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        region: &str,
    ) -> Result<SignedRequest, SigningError> {
        self.sign_at(method, url, region, Utc::now())
    }

    /// Signs `method url` for `region` as of `now`.
    ///
    /// # Errors
    ///
    /// See [`RequestSigner::sign`].
    pub fn sign_at(
        &self,
        method: &str,
        url: &str,
        region: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedRequest, SigningError> {
        let credentials = self.credentials.credentials()?;
        let target = SigningTarget::parse(url)?;
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{region}/{}/{TERMINATOR}", self.service);

        let mut signed_headers = vec![
            ("host".to_owned(), target.host.clone()),
            ("x-amz-date".to_owned(), amz_date.clone()),
        ];
        if let Some(token) = credentials.session_token() {
            signed_headers.push(("x-amz-security-token".to_owned(), token.to_owned()));
        }

        let canonical = canonical_request(method, &target, &signed_headers);
        let to_sign = string_to_sign(&amz_date, &scope, &canonical);
        let key = signing_key(&credentials, &date, region, &self.service)?;
        let signature = format!("{:x}", hmac(&key, to_sign.as_bytes())?);

        let header_names = signed_header_names(&signed_headers);
        let authorization = format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={header_names}, Signature={signature}",
            credentials.access_key_id()
        );

        let mut headers = vec![("X-Amz-Date".to_owned(), amz_date)];
        if let Some(token) = credentials.session_token() {
            headers.push(("X-Amz-Security-Token".to_owned(), token.to_owned()));
        }
        headers.push(("Authorization".to_owned(), authorization));

        Ok(SignedRequest {
            method: method.to_owned(),
            url: url.to_owned(),
            headers,
            signature,
        })
    }
}

/// The parts of a URL that take part in the signature.
#[derive(Debug)]
struct SigningTarget {
    host: String,
    path: String,
    query: String,
}

impl SigningTarget {
    fn parse(url: &str) -> Result<Self, SigningError> {
        let invalid = |reason: String| SigningError::InvalidUrl {
            url: url.to_owned(),
            reason,
        };
        let uri: Uri = url
            .parse()
            .map_err(|e: ureq::http::uri::InvalidUri| invalid(e.to_string()))?;
        let host = uri
            .host()
            .ok_or_else(|| invalid("missing host".to_owned()))?;
        let default_port = match uri.scheme_str() {
            Some("http") => 80,
            _ => 443,
        };
        let host = match uri.port_u16() {
            Some(port) if port != default_port => format!("{host}:{port}"),
            _ => host.to_owned(),
        };
        Ok(Self {
            host,
            path: uri.path().to_owned(),
            query: uri.query().unwrap_or_default().to_owned(),
        })
    }
}

fn canonical_request(
    method: &str,
    target: &SigningTarget,
    headers: &[(String, String)],
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();
    format!(
        "{method}\n{}\n{}\n{canonical_headers}\n{}\n{EMPTY_PAYLOAD_SHA256}",
        canonical_uri(&target.path),
        canonical_query(&target.query),
        signed_header_names(headers),
    )
}

fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    let digest = Sha256::digest(canonical_request.as_bytes());
    format!("{ALGORITHM}\n{amz_date}\n{scope}\n{digest:x}")
}

fn signing_key(
    credentials: &Credentials,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SigningError> {
    let secret = format!("AWS4{}", credentials.secret_access_key());
    let date_key = hmac(secret.as_bytes(), date.as_bytes())?;
    let region_key = hmac(&date_key, region.as_bytes())?;
    let service_key = hmac(&region_key, service.as_bytes())?;
    Ok(hmac(&service_key, TERMINATOR.as_bytes())?.to_vec())
}

fn hmac(key: &[u8], data: &[u8]) -> Result<hmac::digest::Output<HmacSha256>, SigningError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| SigningError::InvalidKey {
        reason: e.to_string(),
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes())
}

fn signed_header_names(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";")
}

/// URI-encode every path byte outside the unreserved set, keeping `/`.
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    path.bytes()
        .map(|byte| match byte {
            b'/' => "/".to_owned(),
            other => encode_byte(other),
        })
        .collect()
}

/// Sort query parameters by name, then value.
fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(&str, &str)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect();
    pairs.sort_unstable();
    pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_byte(byte: u8) -> String {
    if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
        char::from(byte).to_string()
    } else {
        format!("%{byte:02X}")
    }
}

#[cfg(test)]
#[path = "signing_tests.rs"]
mod tests;
