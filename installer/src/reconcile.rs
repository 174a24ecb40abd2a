//! Idempotent package installation.
//!
//! Installation goes through `yum` so that dependencies resolve. When the
//! staged version is already installed `yum install` reports "Nothing to do";
//! a single `yum downgrade` follow-up then handles rollbacks to an older
//! build. A competing audit daemon, if present, is stopped and removed first.
//! Failure to remove it is logged and otherwise ignored.

use crate::executor::{CommandExecutor, combined_output};
use camino::Utf8Path;
use log::{debug, info, warn};
use std::fmt;
use std::io;

/// Output fragment reported when the requested version is already current.
pub const NOTHING_TO_DO: &str = "Nothing to do";

/// Service manager used to stop the conflicting daemon.
const SERVICE_COMMAND: &str = "/sbin/service";

/// A package-manager transaction applied to the staged package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageVerb {
    /// `yum install`.
    Install,
    /// `yum downgrade`.
    Downgrade,
}

impl PackageVerb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Downgrade => "downgrade",
        }
    }
}

impl fmt::Display for PackageVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from installing the staged package.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// The package manager could not be run.
    #[error("unable to run yum {verb}: {source}")]
    Spawn {
        /// The attempted transaction.
        verb: PackageVerb,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The transaction failed for a reason other than nothing-to-do.
    #[error("unable to install chronicle ({verb}): {output}")]
    Failed {
        /// The failed transaction.
        verb: PackageVerb,
        /// Package-manager output.
        output: String,
    },
}

/// How an install run concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The package was newly installed or upgraded.
    Installed,
    /// An older build replaced the installed one.
    Downgraded,
    /// The staged build was already installed.
    NoOpAlreadyCurrent,
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Installed => "installed",
            Self::Downgraded => "downgraded",
            Self::NoOpAlreadyCurrent => "already current",
        };
        f.write_str(text)
    }
}

/// A package whose daemon conflicts with the installed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictingComponent {
    package: String,
    service: String,
}

impl Default for ConflictingComponent {
    fn default() -> Self {
        Self::new("audit", "auditd")
    }
}

impl ConflictingComponent {
    /// Describes a package and the service it runs.
    #[must_use]
    pub fn new(package: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            service: service.into(),
        }
    }

    /// Returns the package name.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }
}

/// What happened to the conflicting component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictRemoval {
    /// The package was not installed.
    NotPresent,
    /// The package was removed.
    Removed,
    /// Removal failed; installation continues regardless.
    RemovalFailed {
        /// Package-manager output.
        output: String,
    },
}

/// Drives install, downgrade, and conflict removal through the host's
/// package manager.
pub struct InstallReconciler<'a> {
    executor: &'a dyn CommandExecutor,
    conflict: ConflictingComponent,
}

impl<'a> InstallReconciler<'a> {
    /// Creates a reconciler that treats the audit daemon as the conflict.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self::with_conflict(executor, ConflictingComponent::default())
    }

    /// Creates a reconciler with a custom conflicting component.
    #[must_use]
    pub fn with_conflict(
        executor: &'a dyn CommandExecutor,
        conflict: ConflictingComponent,
    ) -> Self {
        Self { executor, conflict }
    }

    /// Stops and removes the conflicting component when it is installed.
    ///
    /// Never fails: a removal failure is logged and reported in the
    /// returned value.
    pub fn remove_conflicting(&self) -> ConflictRemoval {
        let package = self.conflict.package();
        if !self.is_installed(package) {
            debug!("{package} is not installed");
            return ConflictRemoval::NotPresent;
        }

        let service = self.conflict.service();
        match self.executor.run(SERVICE_COMMAND, &[service, "stop"]) {
            Ok(output) if !output.status.success() => {
                debug!("stopping {service} failed: {}", combined_output(&output).trim());
            }
            Ok(_) => debug!("stopped {service}"),
            Err(err) => warn!("unable to stop {service}: {err}"),
        }

        match self.executor.run("yum", &["-y", "remove", package]) {
            Ok(output) if output.status.success() => {
                info!("removed {package}");
                ConflictRemoval::Removed
            }
            Ok(output) => {
                let output = combined_output(&output);
                warn!("unable to remove {package}: {output}");
                ConflictRemoval::RemovalFailed { output }
            }
            Err(err) => {
                let output = err.to_string();
                warn!("unable to remove {package}: {output}");
                ConflictRemoval::RemovalFailed { output }
            }
        }
    }

    /// Installs `artefact`, falling back to one downgrade when the install
    /// reports nothing to do.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError`] when either transaction fails with any
    /// output other than the nothing-to-do message.
    pub fn install(&self, artefact: &Utf8Path) -> Result<InstallOutcome, InstallError> {
        if self.apply(PackageVerb::Install, artefact)? {
            return Ok(InstallOutcome::Installed);
        }
        info!("{artefact} is already installed; trying a downgrade");
        if self.apply(PackageVerb::Downgrade, artefact)? {
            return Ok(InstallOutcome::Downgraded);
        }
        Ok(InstallOutcome::NoOpAlreadyCurrent)
    }

    /// Returns `Ok(true)` when the transaction changed the system and
    /// `Ok(false)` when it had nothing to do.
    fn apply(&self, verb: PackageVerb, artefact: &Utf8Path) -> Result<bool, InstallError> {
        let output = self
            .executor
            .run("yum", &["-y", verb.as_str(), artefact.as_str()])
            .map_err(|source| InstallError::Spawn { verb, source })?;
        if output.status.success() {
            return Ok(true);
        }
        let output = combined_output(&output);
        if output.contains(NOTHING_TO_DO) {
            debug!("yum {verb}: nothing to do");
            return Ok(false);
        }
        Err(InstallError::Failed { verb, output })
    }

    fn is_installed(&self, package: &str) -> bool {
        match self.executor.run("rpm", &["-q", package]) {
            Ok(output) => output.status.success(),
            Err(err) => {
                debug!("unable to query {package}: {err}");
                false
            }
        }
    }
}
