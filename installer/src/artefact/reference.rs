//! Artefact identity: which build of the daemon package to request.

use std::fmt;

/// The pinned package version requested when `--latest` is not given.
pub const PINNED_VERSION: &str = "chronicled-2.0.1228.0-1_naws";

/// Selects the package version requested from the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    /// Request an explicit version string.
    Pinned(String),
    /// Let the control plane choose the newest build for the architecture.
    Latest,
}

impl Default for VersionSelector {
    fn default() -> Self {
        Self::Pinned(PINNED_VERSION.to_owned())
    }
}

/// Identifies the package build to download.
///
/// # Examples
///
/// ```
/// use chronicle_installer::artefact::reference::{ArtefactReference, VersionSelector};
///
/// let pinned = ArtefactReference::new(VersionSelector::default(), "x86_64");
/// assert_eq!(
///     pinned.request_component(),
///     "chronicled-2.0.1228.0-1_naws.x86_64.rpm"
/// );
///
/// let latest = ArtefactReference::new(VersionSelector::Latest, "aarch64");
/// assert_eq!(latest.request_component(), "aarch64");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtefactReference {
    selector: VersionSelector,
    architecture: String,
}

impl ArtefactReference {
    /// Creates a reference for `architecture`.
    #[must_use]
    pub fn new(selector: VersionSelector, architecture: impl Into<String>) -> Self {
        Self {
            selector,
            architecture: architecture.into(),
        }
    }

    /// Returns the version selector.
    #[must_use]
    pub fn selector(&self) -> &VersionSelector {
        &self.selector
    }

    /// Returns the machine architecture, e.g. `x86_64`.
    #[must_use]
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// Returns the path component appended to the control endpoint's
    /// `/rpm/` route.
    #[must_use]
    pub fn request_component(&self) -> String {
        match &self.selector {
            VersionSelector::Pinned(version) => format!("{version}.{}.rpm", self.architecture),
            VersionSelector::Latest => self.architecture.clone(),
        }
    }
}

impl fmt::Display for ArtefactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.request_component())
    }
}

/// Returns the host's machine hardware name, as `uname -m` reports it.
#[must_use]
pub fn host_architecture() -> String {
    rustix::system::uname()
        .machine()
        .to_string_lossy()
        .into_owned()
}
