//! Provisioning run orchestration.
//!
//! The driver sequences the components in a fixed order: prepare the
//! staging directory, download, make sure the package database is usable,
//! verify the package, clear the conflicting component, and install. Once a
//! package has been staged it is removed before the run returns, whichever
//! step failed.

use crate::artefact::download::ArtefactDownloader;
use crate::artefact::staging::StagingArtefact;
use crate::clock::Sleeper;
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::executor::CommandExecutor;
use crate::lock::{LockOutcome, LockRecovery};
use crate::reconcile::{ConflictRemoval, InstallOutcome, InstallReconciler};
use crate::trust::{PinnedKey, TrustVerifier};
use log::{info, warn};

/// Host-facing collaborators used by a run.
#[derive(Clone, Copy)]
pub struct ProvisionServices<'a> {
    /// Places the package at the staging path.
    pub downloader: &'a dyn ArtefactDownloader,
    /// Runs package-manager, service, and `fuser` commands.
    pub executor: &'a dyn CommandExecutor,
    /// Blocks between lock checks.
    pub sleeper: &'a dyn Sleeper,
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// State of the package database before installing.
    pub lock: LockOutcome,
    /// What happened to the conflicting component.
    pub conflict: ConflictRemoval,
    /// How installation concluded.
    pub outcome: InstallOutcome,
}

/// Runs the provisioning sequence once.
pub struct ProvisionDriver<'a> {
    config: &'a ProvisionConfig,
    services: ProvisionServices<'a>,
    key: PinnedKey,
}

impl<'a> ProvisionDriver<'a> {
    /// Creates a driver verifying against the shipped signing key.
    #[must_use]
    pub fn new(config: &'a ProvisionConfig, services: ProvisionServices<'a>) -> Self {
        Self {
            config,
            services,
            key: PinnedKey::default(),
        }
    }

    /// Replaces the signing key packages are verified against.
    #[must_use]
    pub fn with_key(mut self, key: PinnedKey) -> Self {
        self.key = key;
        self
    }

    /// Provisions the package.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProvisionError`] encountered. When a later step
    /// fails and removing the staged package also fails, the step's error is
    /// returned and the removal failure is logged.
    pub fn run(&self) -> Result<ProvisionReport> {
        let staging = &self.config.staging;
        staging.ensure()?;
        let artefact = self
            .services
            .downloader
            .download(&self.config.reference, staging)?;

        let result = self.process(&artefact);
        let path = artefact.path().to_owned();
        let cleanup = artefact
            .cleanup()
            .map_err(|source| ProvisionError::Cleanup { path, source });

        match (result, cleanup) {
            (Ok(report), Ok(())) => {
                info!("chronicled {}", report.outcome);
                Ok(report)
            }
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(err), Err(cleanup_err)) => {
                warn!("{cleanup_err}");
                Err(err)
            }
        }
    }

    fn process(&self, artefact: &StagingArtefact) -> Result<ProvisionReport> {
        let services = self.services;
        let lock = LockRecovery::new(
            services.executor,
            services.sleeper,
            self.config.rpm_db_dir.clone(),
        )
        .ensure_usable()?;

        TrustVerifier::new(
            services.executor,
            self.key.clone(),
            self.config.staging.key_path(),
        )
        .verify(artefact.path())?;

        let reconciler = InstallReconciler::new(services.executor);
        let conflict = reconciler.remove_conflicting();
        let outcome = reconciler.install(artefact.path())?;
        Ok(ProvisionReport {
            lock,
            conflict,
            outcome,
        })
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
