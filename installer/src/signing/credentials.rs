//! Ambient credential discovery.
//!
//! Credentials come from the execution environment: first the standard
//! `AWS_*` environment variables, then the instance role published through
//! the instance metadata service. Missing credentials are fatal for the run;
//! they are never retried.

use crate::metadata::{InstanceMetadataClient, MetadataError, ROLE_CREDENTIALS_PATH};
use log::debug;
use serde::Deserialize;
use std::fmt;

const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY_ID";
const SECRET_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

/// A set of signing credentials.
///
/// The secret key and session token are redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    /// Creates credentials from their parts.
    #[must_use]
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Returns the access key identifier.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Returns the secret access key.
    #[must_use]
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// Returns the session token of temporary credentials.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Raised when no ambient credentials are available.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Every source in the chain came up empty.
    #[error("no credentials available: {reason}")]
    Unavailable {
        /// Why the last source failed.
        reason: String,
    },

    /// The instance role lookup failed.
    #[error("unable to read instance role credentials: {0}")]
    InstanceRole(#[from] MetadataError),
}

/// Capability for obtaining signing credentials.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialsProvider {
    /// Returns credentials for signing a request.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when no credentials can be found.
    fn credentials(&self) -> Result<Credentials, CredentialError>;
}

/// Reads credentials from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentCredentials;

impl CredentialsProvider for EnvironmentCredentials {
    fn credentials(&self) -> Result<Credentials, CredentialError> {
        let access_key_id = non_empty_var(ACCESS_KEY_VAR);
        let secret_access_key = non_empty_var(SECRET_KEY_VAR);
        match (access_key_id, secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(Credentials::new(
                access_key_id,
                secret_access_key,
                non_empty_var(SESSION_TOKEN_VAR),
            )),
            _ => Err(CredentialError::Unavailable {
                reason: format!("{ACCESS_KEY_VAR} and {SECRET_KEY_VAR} are not both set"),
            }),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RoleCredentialsDocument {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
}

/// Reads the instance role's temporary credentials from instance metadata.
pub struct InstanceRoleCredentials<'a> {
    metadata: &'a InstanceMetadataClient<'a>,
}

impl<'a> InstanceRoleCredentials<'a> {
    /// Creates a provider backed by `metadata`.
    #[must_use]
    pub fn new(metadata: &'a InstanceMetadataClient<'a>) -> Self {
        Self { metadata }
    }
}

impl CredentialsProvider for InstanceRoleCredentials<'_> {
    fn credentials(&self) -> Result<Credentials, CredentialError> {
        let listing = self
            .metadata
            .get_text(ROLE_CREDENTIALS_PATH, "instance role name")?;
        let role = listing
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| CredentialError::Unavailable {
                reason: "the instance has no role attached".to_owned(),
            })?;

        let what = "instance role credentials";
        let body = self
            .metadata
            .get_text(&format!("{ROLE_CREDENTIALS_PATH}{role}"), what)?;
        let document: RoleCredentialsDocument =
            serde_json::from_str(&body).map_err(|e| MetadataError::InvalidDocument {
                what,
                reason: e.to_string(),
            })?;
        Ok(Credentials::new(
            document.access_key_id,
            document.secret_access_key,
            document.token,
        ))
    }
}

/// Tries each provider in order and returns the first credentials found.
pub struct CredentialChain<'a> {
    providers: Vec<&'a dyn CredentialsProvider>,
}

impl<'a> CredentialChain<'a> {
    /// Creates a chain over `providers`.
    #[must_use]
    pub fn new(providers: Vec<&'a dyn CredentialsProvider>) -> Self {
        Self { providers }
    }
}

impl CredentialsProvider for CredentialChain<'_> {
    fn credentials(&self) -> Result<Credentials, CredentialError> {
        let mut last_error = CredentialError::Unavailable {
            reason: "no credential sources configured".to_owned(),
        };
        for provider in &self.providers {
            match provider.credentials() {
                Ok(credentials) => return Ok(credentials),
                Err(err) => {
                    debug!("credential source skipped: {err}");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}
