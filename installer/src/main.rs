//! Chronicle installer CLI entrypoint.
//!
//! This binary downloads, verifies, and installs the `chronicled` RPM on the
//! current host. Failures are logged and, unless `--error-exit-code` says
//! otherwise, the process still exits with status 0 so bootstrap automation
//! carries on.

use chronicle_installer::artefact::download::ControlPlaneDownloader;
use chronicle_installer::artefact::reference::host_architecture;
use chronicle_installer::cli::Cli;
use chronicle_installer::clock::ThreadSleeper;
use chronicle_installer::config::{ExitPolicy, ProvisionConfig};
use chronicle_installer::error::Result;
use chronicle_installer::executor::SystemCommandExecutor;
use chronicle_installer::fetch::RetryingFetcher;
use chronicle_installer::fetch::transport::UreqTransport;
use chronicle_installer::logging;
use chronicle_installer::metadata::InstanceMetadataClient;
use chronicle_installer::pipeline::{ProvisionDriver, ProvisionReport, ProvisionServices};
use chronicle_installer::signing::credentials::{
    CredentialChain, EnvironmentCredentials, InstanceRoleCredentials,
};
use clap::Parser;
use log::error;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = logging::init(cli.verbose) {
        writeln!(std::io::stderr(), "failed to initialise logging: {err}").unwrap_or_default();
    }
    let policy = ExitPolicy::from(&cli);

    let result = run(&cli);
    if let Err(err) = &result {
        error!("chronicled was not installed: {err}");
    }
    log::logger().flush();

    let exit_code = policy.exit_code_for(&result);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli) -> Result<ProvisionReport> {
    let architecture = host_architecture();
    let config = ProvisionConfig::from_cli(cli, architecture)?;

    let transport = UreqTransport;
    let sleeper = ThreadSleeper;
    let executor = SystemCommandExecutor;

    let metadata = InstanceMetadataClient::new(&transport, config.http_timeout);
    let environment = EnvironmentCredentials;
    let instance_role = InstanceRoleCredentials::new(&metadata);
    let credentials = CredentialChain::new(vec![&environment, &instance_role]);

    let fetcher = RetryingFetcher::new(&transport, &sleeper, config.backoff);
    let downloader =
        ControlPlaneDownloader::new(&metadata, &credentials, &fetcher, config.http_timeout);

    let services = ProvisionServices {
        downloader: &downloader,
        executor: &executor,
        sleeper: &sleeper,
    };
    ProvisionDriver::new(&config, services).run()
}
