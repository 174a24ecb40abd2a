//! Chronicle installer library.
//!
//! This crate provisions the signed `chronicled` RPM onto a host during
//! bootstrap: it resolves the regional control endpoint, obtains a presigned
//! download location with a SigV4-signed request, downloads the package with
//! bounded retries, verifies it against a pinned signing key, repairs a
//! stale package-database lock when that is safe, and installs it with a
//! downgrade fallback. It is used by the `chronicle-installer` binary and can
//! be driven programmatically with substitute collaborators for testing.
//!
//! # Modules
//!
//! - [`artefact`] - Package reference, staging, and download
//! - [`cli`] - Command-line argument definitions
//! - [`clock`] - Blocking pauses for backoff and lock re-checks
//! - [`config`] - Run configuration and exit-code policy
//! - [`endpoint`] - Region to control-plane endpoint resolution
//! - [`error`] - Top-level error taxonomy
//! - [`executor`] - Host command execution seam
//! - [`fetch`] - HTTP transport and retrying fetcher
//! - [`lock`] - Package-database lock recovery
//! - [`logging`] - Stdout and syslog logger
//! - [`metadata`] - Instance metadata region lookup
//! - [`pipeline`] - Provisioning run orchestration
//! - [`reconcile`] - Idempotent install and conflict removal
//! - [`signing`] - SigV4 request signing and credentials
//! - [`trust`] - Signing-key pinning and signature verification

pub mod artefact;
pub mod cli;
pub mod clock;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod lock;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod reconcile;
pub mod signing;
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
pub mod trust;
