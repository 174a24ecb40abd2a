//! Behaviour-driven tests for whole provisioning runs.
//!
//! These scenarios wire the real downloader, verifier, lock recovery, and
//! reconciler together. The network, the instance metadata service, and the
//! host package manager are replaced with scripted fakes; staging happens in
//! a temporary directory.

use camino::{Utf8Path, Utf8PathBuf};
use chronicle_installer::artefact::download::ControlPlaneDownloader;
use chronicle_installer::cli::Cli;
use chronicle_installer::config::{ExitPolicy, ProvisionConfig, SettingsFile};
use chronicle_installer::error::{ProvisionError, Result as RunResult};
use chronicle_installer::fetch::RetryingFetcher;
use chronicle_installer::pipeline::{ProvisionDriver, ProvisionReport, ProvisionServices};
use chronicle_installer::test_utils::{
    ExpectedCall, RecordingSleeper, ScriptedTransport, StaticCredentials, StaticRegion,
    StubExecutor, failure_output, output_with, success_output,
};
use chronicle_installer::trust::PINNED_KEY_ID;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::{Cell, RefCell};
use std::process::Output;
use tempfile::TempDir;

const PRESIGNED_URL: &str = "https://chronicle-artefacts.example/chronicled.rpm?X-Amz-Signature=abc";

struct ProvisionWorld {
    _temp: TempDir,
    root: Utf8PathBuf,
    region: RefCell<String>,
    error_exit_code: Cell<i32>,
    transport: ScriptedTransport,
    executor: StubExecutor,
    sleeper: RecordingSleeper,
    result: RefCell<Option<RunResult<ProvisionReport>>>,
    exit_code: Cell<Option<i32>>,
}

impl ProvisionWorld {
    fn staging_dir(&self) -> Utf8PathBuf {
        self.root.join("chronicle")
    }

    fn artefact(&self) -> String {
        self.staging_dir().join("chronicled.rpm").into_string()
    }

    fn key(&self) -> String {
        self.staging_dir().join("public_key").into_string()
    }

    fn expect(&self, cmd: &str, args: &[&str], output: Output) {
        self.executor.push(ExpectedCall::new(cmd, args, output));
    }

    fn expect_verification(&self, signature: &str) {
        let artefact = self.artefact();
        let key = self.key();
        self.expect("rpm", &["-q", "rpm"], success_output());
        self.expect("rpm", &["--import", &key], success_output());
        self.expect(
            "rpm",
            &["-qp", "--qf", "%{SIGPGP:pgpsig}", &artefact],
            output_with(0, signature, ""),
        );
    }

    fn cli(&self) -> Cli {
        Cli {
            error_exit_code: self.error_exit_code.get(),
            ..Cli::default()
        }
    }

    fn config(&self) -> ProvisionConfig {
        let cli = self.cli();
        let settings = SettingsFile {
            staging_dir: Some(self.staging_dir()),
            rpm_db_dir: Some(self.root.join("rpm")),
            base_delay_ms: Some(1),
            ..SettingsFile::default()
        };
        ProvisionConfig::from_parts(&cli, "x86_64", settings).expect("valid settings")
    }

    fn error(&self) -> std::cell::Ref<'_, ProvisionError> {
        std::cell::Ref::map(self.result.borrow(), |result| {
            match result.as_ref().expect("installer has run") {
                Ok(report) => panic!("expected a failure, got {report:?}"),
                Err(err) => err,
            }
        })
    }
}

#[fixture]
fn provision_world() -> ProvisionWorld {
    let temp = TempDir::new().expect("temp dir");
    let root = Utf8Path::from_path(temp.path())
        .expect("utf-8 temp dir")
        .to_owned();
    ProvisionWorld {
        _temp: temp,
        root,
        region: RefCell::new(String::new()),
        error_exit_code: Cell::new(0),
        transport: ScriptedTransport::default(),
        executor: StubExecutor::new(Vec::new()),
        sleeper: RecordingSleeper::default(),
        result: RefCell::new(None),
        exit_code: Cell::new(None),
    }
}

#[given("a host in region \"{region}\"")]
fn given_region(provision_world: &ProvisionWorld, region: String) {
    provision_world.region.replace(region);
}

#[given("failures exit with code {code}")]
fn given_exit_code(provision_world: &ProvisionWorld, code: i32) {
    provision_world.error_exit_code.set(code);
}

#[given("the control plane serves a package")]
fn given_package_served(provision_world: &ProvisionWorld) {
    provision_world.transport.respond(200, PRESIGNED_URL);
    provision_world.transport.respond(200, b"chronicled rpm".to_vec());
}

#[given("the control plane refuses the request")]
fn given_request_refused(provision_world: &ProvisionWorld) {
    for _ in 0..5 {
        provision_world.transport.respond(403, "AccessDenied");
    }
}

#[given("the package is signed by the pinned key")]
fn given_signed(provision_world: &ProvisionWorld) {
    provision_world.expect_verification(&format!(
        "RSA/SHA256, Mon 01 Jan 2024 00:00:00 UTC, Key ID {PINNED_KEY_ID}"
    ));
    let artefact = provision_world.artefact();
    provision_world.expect("rpm", &["--checksig", &artefact], success_output());
    provision_world.expect(
        "rpm",
        &["-q", "audit"],
        failure_output("package audit is not installed"),
    );
}

#[given("the package carries no pinned signature")]
fn given_unsigned(provision_world: &ProvisionWorld) {
    provision_world.expect_verification("(none)");
}

#[given("the package installs cleanly")]
fn given_installs(provision_world: &ProvisionWorld) {
    let artefact = provision_world.artefact();
    provision_world.expect("yum", &["-y", "install", &artefact], success_output());
}

#[given("the installed package is newer")]
fn given_newer_installed(provision_world: &ProvisionWorld) {
    let artefact = provision_world.artefact();
    provision_world.expect(
        "yum",
        &["-y", "install", &artefact],
        failure_output("Error: Nothing to do\n"),
    );
    provision_world.expect("yum", &["-y", "downgrade", &artefact], success_output());
}

#[given("the package manager rejects the install")]
fn given_install_rejected(provision_world: &ProvisionWorld) {
    let artefact = provision_world.artefact();
    provision_world.expect(
        "yum",
        &["-y", "install", &artefact],
        failure_output("Error: Transaction check error\n"),
    );
}

#[when("the installer runs")]
fn when_installer_runs(provision_world: &ProvisionWorld) {
    let config = provision_world.config();
    let region = StaticRegion(provision_world.region.borrow().clone());
    let credentials = StaticCredentials::example();
    let fetcher = RetryingFetcher::new(
        &provision_world.transport,
        &provision_world.sleeper,
        config.backoff,
    );
    let downloader = ControlPlaneDownloader::new(&region, &credentials, &fetcher, config.http_timeout);
    let services = ProvisionServices {
        downloader: &downloader,
        executor: &provision_world.executor,
        sleeper: &provision_world.sleeper,
    };

    let result = ProvisionDriver::new(&config, services).run();
    provision_world
        .exit_code
        .set(Some(ExitPolicy::from(&provision_world.cli()).exit_code_for(&result)));
    provision_world.result.replace(Some(result));
    provision_world.executor.assert_finished();
}

#[then("the package is reported \"{outcome}\"")]
fn then_outcome(provision_world: &ProvisionWorld, outcome: String) {
    let result = provision_world.result.borrow();
    match result.as_ref().expect("installer has run") {
        Ok(report) => assert_eq!(report.outcome.to_string(), outcome),
        Err(err) => panic!("expected success, got {err}"),
    }
}

#[then("the run fails with a trust error")]
fn then_trust_error(provision_world: &ProvisionWorld) {
    assert!(matches!(*provision_world.error(), ProvisionError::Trust(_)));
}

#[then("the run fails with an install error")]
fn then_install_error(provision_world: &ProvisionWorld) {
    assert!(matches!(
        *provision_world.error(),
        ProvisionError::Install(_)
    ));
}

#[then("the run fails with HTTP status {status}")]
fn then_http_error(provision_world: &ProvisionWorld, status: u16) {
    let err = provision_world.error();
    assert!(
        matches!(*err, ProvisionError::Http { status: got, .. } if got == status),
        "unexpected error: {}",
        *err
    );
}

#[then("the location was requested from \"{url}\"")]
fn then_location_url(provision_world: &ProvisionWorld, url: String) {
    let requests = provision_world.transport.requests();
    let first = requests.first().expect("a request was sent");
    assert_eq!(first.url, url);
    assert!(
        first
            .headers
            .iter()
            .any(|(name, value)| name == "Authorization" && value.starts_with("AWS4-HMAC-SHA256"))
    );
}

#[then("the exit code is {code}")]
fn then_exit_code(provision_world: &ProvisionWorld, code: i32) {
    assert_eq!(provision_world.exit_code.get(), Some(code));
}

#[then("no staged files remain")]
fn then_nothing_staged(provision_world: &ProvisionWorld) {
    assert!(!Utf8Path::new(&provision_world.artefact()).exists());
    assert!(!Utf8Path::new(&provision_world.key()).exists());
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/provision.feature", index = 0)]
fn scenario_signed_package_installs(provision_world: ProvisionWorld) {
    let _ = provision_world;
}

#[scenario(path = "tests/features/provision.feature", index = 1)]
fn scenario_current_package_downgrades(provision_world: ProvisionWorld) {
    let _ = provision_world;
}

#[scenario(path = "tests/features/provision.feature", index = 2)]
fn scenario_unsigned_package_discarded(provision_world: ProvisionWorld) {
    let _ = provision_world;
}

#[scenario(path = "tests/features/provision.feature", index = 3)]
fn scenario_failed_install_exit_code(provision_world: ProvisionWorld) {
    let _ = provision_world;
}

#[scenario(path = "tests/features/provision.feature", index = 4)]
fn scenario_refused_location_request(provision_world: ProvisionWorld) {
    let _ = provision_world;
}
