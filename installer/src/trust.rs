//! Package signature verification against a pinned key.
//!
//! Verification imports the shipped public key into the package manager's
//! key ring, then requires two independent checks to pass: the package's
//! embedded signature must name the pinned key id, and the package manager's
//! own signature check must accept the package. The key ring alone would
//! accept any imported key, so the key-id check binds the package to this
//! specific signer. None of these failures is retried.

use crate::artefact::staging::remove_if_present;
use crate::executor::{CommandExecutor, combined_output};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use std::fs;
use std::io;

/// Short identifier of the key that signs released packages.
pub const PINNED_KEY_ID: &str = "c6c1edb02882f26a";

/// ASCII-armoured public half of the package signing key.
pub const PINNED_PUBLIC_KEY: &str = include_str!("../keys/chronicle-signing-key.asc");

/// Query format printing a package's PGP signature summary.
const SIGNATURE_QUERY_FORMAT: &str = "%{SIGPGP:pgpsig}";

/// Errors from verifying a staged package.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// The key file could not be written.
    #[error("unable to write public key to {path}: {source}")]
    KeyWrite {
        /// Where the key was being written.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The package manager refused to import the key.
    #[error("unable to import public key: {output}")]
    KeyImport {
        /// Package-manager output.
        output: String,
    },

    /// The package's signature could not be read.
    #[error("error reading signature from RPM: {output}")]
    SignatureRead {
        /// Package-manager output.
        output: String,
    },

    /// The package is not signed by the pinned key.
    #[error("RPM is not signed")]
    Unsigned,

    /// The package manager rejected the signature.
    #[error("RPM has invalid signature: {output}")]
    InvalidSignature {
        /// Package-manager output.
        output: String,
    },
}

/// A public key and its expected short identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedKey {
    armoured: String,
    key_id: String,
}

impl Default for PinnedKey {
    fn default() -> Self {
        Self::new(PINNED_PUBLIC_KEY, PINNED_KEY_ID)
    }
}

impl PinnedKey {
    /// Creates a pinned key from its armoured text and short id.
    #[must_use]
    pub fn new(armoured: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            armoured: armoured.into(),
            key_id: key_id.into(),
        }
    }

    /// Returns the armoured key text.
    #[must_use]
    pub fn armoured(&self) -> &str {
        &self.armoured
    }

    /// Returns the 16-hex-digit key id.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Verifies staged packages with the host package manager.
pub struct TrustVerifier<'a> {
    executor: &'a dyn CommandExecutor,
    key: PinnedKey,
    key_path: Utf8PathBuf,
}

impl<'a> TrustVerifier<'a> {
    /// Creates a verifier that writes `key` to `key_path` before import.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        key: PinnedKey,
        key_path: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            executor,
            key,
            key_path: key_path.into(),
        }
    }

    /// Imports the pinned key and verifies `artefact`.
    ///
    /// # Errors
    ///
    /// Returns the first [`TrustError`] encountered; later steps are not
    /// attempted.
    pub fn verify(&self, artefact: &Utf8Path) -> Result<(), TrustError> {
        self.import_key()?;
        self.check_key_id(artefact)?;
        self.check_signature(artefact)?;
        info!("{artefact} is signed by {}", self.key.key_id());
        Ok(())
    }

    fn import_key(&self) -> Result<(), TrustError> {
        fs::write(&self.key_path, self.key.armoured()).map_err(|source| {
            TrustError::KeyWrite {
                path: self.key_path.clone(),
                source,
            }
        })?;
        let result = self.run_checked("rpm", &["--import", self.key_path.as_str()]);
        if let Err(err) = remove_if_present(&self.key_path) {
            warn!("failed to remove {}: {err}", self.key_path);
        }
        result.map_err(|output| TrustError::KeyImport { output })?;
        debug!("imported key {}", self.key.key_id());
        Ok(())
    }

    fn check_key_id(&self, artefact: &Utf8Path) -> Result<(), TrustError> {
        let output = self
            .executor
            .run("rpm", &["-qp", "--qf", SIGNATURE_QUERY_FORMAT, artefact.as_str()])
            .map_err(|err| TrustError::SignatureRead {
                output: err.to_string(),
            })?;
        if !output.status.success() {
            return Err(TrustError::SignatureRead {
                output: combined_output(&output),
            });
        }
        let signature = String::from_utf8_lossy(&output.stdout);
        if !signature.contains(self.key.key_id()) {
            debug!("signature summary: {}", signature.trim());
            return Err(TrustError::Unsigned);
        }
        Ok(())
    }

    fn check_signature(&self, artefact: &Utf8Path) -> Result<(), TrustError> {
        self.run_checked("rpm", &["--checksig", artefact.as_str()])
            .map_err(|output| TrustError::InvalidSignature { output })
    }

    /// Run a command, returning its combined output on any failure.
    fn run_checked(&self, cmd: &str, args: &[&str]) -> Result<(), String> {
        match self.executor.run(cmd, args) {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(combined_output(&output)),
            Err(err) => Err(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ExpectedCall, StubExecutor, failure_output, output_with, success_output};
    use tempfile::TempDir;

    const ARTEFACT: &str = "/staging/chronicled.rpm";
    const GOOD_SIGNATURE: &str = "RSA/SHA256, Tue 01 Jun 2021 12:00:00 PM UTC, Key ID c6c1edb02882f26a";

    struct Fixture {
        _temp: TempDir,
        key_path: Utf8PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().expect("temp dir");
        let key_path = Utf8Path::from_path(temp.path())
            .expect("utf-8 temp dir")
            .join("public_key");
        Fixture {
            _temp: temp,
            key_path,
        }
    }

    fn import(key_path: &Utf8Path, output: std::process::Output) -> ExpectedCall {
        ExpectedCall::new("rpm", &["--import", key_path.as_str()], output)
    }

    fn query(output: std::process::Output) -> ExpectedCall {
        ExpectedCall::new("rpm", &["-qp", "--qf", "%{SIGPGP:pgpsig}", ARTEFACT], output)
    }

    fn checksig(output: std::process::Output) -> ExpectedCall {
        ExpectedCall::new("rpm", &["--checksig", ARTEFACT], output)
    }

    #[test]
    fn shipped_key_is_an_armoured_public_key() {
        let key = PinnedKey::default();
        assert!(key.armoured().starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));
        assert!(key.armoured().trim_end().ends_with("-----END PGP PUBLIC KEY BLOCK-----"));
        assert_eq!(key.key_id().len(), 16);
    }

    #[test]
    fn accepts_a_package_signed_by_the_pinned_key() {
        let fx = fixture();
        let executor = StubExecutor::new(vec![
            import(&fx.key_path, success_output()),
            query(output_with(0, GOOD_SIGNATURE, "")),
            checksig(output_with(0, "chronicled.rpm: digests signatures OK\n", "")),
        ]);
        let verifier = TrustVerifier::new(&executor, PinnedKey::default(), fx.key_path.clone());

        verifier.verify(Utf8Path::new(ARTEFACT)).expect("verified");

        executor.assert_finished();
        assert!(!fx.key_path.exists(), "key file is removed after import");
    }

    #[test]
    fn rejects_a_package_signed_by_another_key() {
        let fx = fixture();
        let executor = StubExecutor::new(vec![
            import(&fx.key_path, success_output()),
            query(output_with(
                0,
                "RSA/SHA256, Tue 01 Jun 2021 12:00:00 PM UTC, Key ID 0123456789abcdef",
                "",
            )),
        ]);
        let verifier = TrustVerifier::new(&executor, PinnedKey::default(), fx.key_path.clone());

        let err = verifier
            .verify(Utf8Path::new(ARTEFACT))
            .expect_err("wrong key");

        assert!(matches!(err, TrustError::Unsigned));
        assert_eq!(err.to_string(), "RPM is not signed");
        executor.assert_finished();
    }

    #[test]
    fn key_id_on_stderr_does_not_count() {
        let fx = fixture();
        let executor = StubExecutor::new(vec![
            import(&fx.key_path, success_output()),
            query(output_with(0, "(none)", PINNED_KEY_ID)),
        ]);
        let verifier = TrustVerifier::new(&executor, PinnedKey::default(), fx.key_path.clone());

        let err = verifier
            .verify(Utf8Path::new(ARTEFACT))
            .expect_err("unsigned");

        assert!(matches!(err, TrustError::Unsigned));
    }

    #[test]
    fn import_failure_stops_verification() {
        let fx = fixture();
        let executor = StubExecutor::new(vec![import(
            &fx.key_path,
            failure_output("error: public_key: import read failed"),
        )]);
        let verifier = TrustVerifier::new(&executor, PinnedKey::default(), fx.key_path.clone());

        let err = verifier
            .verify(Utf8Path::new(ARTEFACT))
            .expect_err("import fails");

        assert!(matches!(err, TrustError::KeyImport { .. }));
        assert!(err.to_string().contains("import read failed"));
        assert!(!fx.key_path.exists());
        executor.assert_finished();
    }

    #[test]
    fn unreadable_signature_is_reported() {
        let fx = fixture();
        let executor = StubExecutor::new(vec![
            import(&fx.key_path, success_output()),
            query(failure_output("error: open of chronicled.rpm failed")),
        ]);
        let verifier = TrustVerifier::new(&executor, PinnedKey::default(), fx.key_path.clone());

        let err = verifier
            .verify(Utf8Path::new(ARTEFACT))
            .expect_err("query fails");

        assert!(matches!(err, TrustError::SignatureRead { .. }));
    }

    #[test]
    fn checksig_failure_is_an_invalid_signature() {
        let fx = fixture();
        let executor = StubExecutor::new(vec![
            import(&fx.key_path, success_output()),
            query(output_with(0, GOOD_SIGNATURE, "")),
            checksig(output_with(1, "chronicled.rpm: DIGESTS SIGNATURES NOT OK\n", "")),
        ]);
        let verifier = TrustVerifier::new(&executor, PinnedKey::default(), fx.key_path.clone());

        let err = verifier
            .verify(Utf8Path::new(ARTEFACT))
            .expect_err("bad signature");

        assert!(matches!(err, TrustError::InvalidSignature { .. }));
        assert!(err.to_string().contains("NOT OK"));
        executor.assert_finished();
    }

    #[test]
    fn unwritable_key_path_is_reported() {
        let executor = StubExecutor::new(Vec::new());
        let verifier = TrustVerifier::new(
            &executor,
            PinnedKey::default(),
            "/nonexistent-dir/for-sure/public_key",
        );

        let err = verifier
            .verify(Utf8Path::new(ARTEFACT))
            .expect_err("cannot write key");

        assert!(matches!(err, TrustError::KeyWrite { .. }));
        executor.assert_finished();
    }
}
