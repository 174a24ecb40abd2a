//! Shared test utilities for the installer crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! behaviour suites under `tests/`.

use crate::clock::Sleeper;
use crate::executor::CommandExecutor;
use crate::fetch::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::metadata::{MetadataError, RegionProvider};
use crate::signing::credentials::{CredentialError, Credentials, CredentialsProvider};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::process::{ExitStatus, Output};
use std::time::Duration;

/// Creates an `ExitStatus` from an exit code.
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates a command `Output` with the given exit code and streams.
#[must_use]
pub fn output_with(code: i32, stdout: &str, stderr: &str) -> Output {
    Output {
        status: exit_status(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    output_with(0, "", "")
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    output_with(1, "", stderr)
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "rpm").
    pub cmd: String,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: io::Result<Output>,
}

impl ExpectedCall {
    /// Expects `cmd args` and answers with `output`.
    #[must_use]
    pub fn new(cmd: &str, args: &[&str], output: Output) -> Self {
        Self {
            cmd: cmd.to_owned(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result: Ok(output),
        }
    }

    /// Expects `cmd args` and fails to spawn it.
    #[must_use]
    pub fn spawn_failure(cmd: &str, args: &[&str]) -> Self {
        Self {
            cmd: cmd.to_owned(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result: Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{cmd}: command not found"),
            )),
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
        }
    }

    /// Appends a further expected call.
    pub fn push(&self, call: ExpectedCall) {
        self.expected.borrow_mut().push_back(call);
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = self.expected.borrow();
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} remain: {:?}",
            remaining.len(),
            remaining.iter().map(|call| &call.cmd).collect::<Vec<_>>()
        );
    }
}

impl CommandExecutor for StubExecutor {
    #[expect(
        clippy::expect_used,
        reason = "an unscripted command is a test failure"
    )]
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        let mut expected = self.expected.borrow_mut();
        let call = expected
            .pop_front()
            .expect("unexpected command invocation");

        assert_eq!(call.cmd, cmd);
        assert_eq!(call.args, args);

        call.result
    }
}

/// A `Sleeper` that records requested pauses without blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pauses: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Returns every pause requested so far, in order.
    #[must_use]
    pub fn recorded(&self) -> Vec<Duration> {
        self.pauses.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.pauses.borrow_mut().push(duration);
    }
}

/// An `HttpTransport` that replays queued outcomes and records requests.
///
/// Once the queue is empty every further request fails with a transport
/// error.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    outcomes: RefCell<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    /// Queues a response.
    pub fn respond(&self, status: u16, body: impl Into<Vec<u8>>) {
        self.outcomes
            .borrow_mut()
            .push_back(Ok(HttpResponse::new(status, body)));
    }

    /// Queues a transport failure.
    pub fn fail(&self, reason: &str) {
        self.outcomes
            .borrow_mut()
            .push_back(Err(TransportError::Request {
                method: crate::fetch::transport::Method::Get,
                url: "scripted".to_owned(),
                reason: reason.to_owned(),
            }));
    }

    /// Returns every request sent so far.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    /// Returns the number of requests sent so far.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        self.outcomes.borrow_mut().pop_front().unwrap_or_else(|| {
            Err(TransportError::Request {
                method: request.method,
                url: request.url.clone(),
                reason: "no scripted response left".to_owned(),
            })
        })
    }
}

/// A `RegionProvider` answering with a fixed region.
#[derive(Debug, Clone)]
pub struct StaticRegion(pub String);

impl RegionProvider for StaticRegion {
    fn region(&self) -> Result<String, MetadataError> {
        Ok(self.0.clone())
    }
}

/// A `CredentialsProvider` answering with fixed credentials, or with
/// [`CredentialError::Unavailable`] when empty.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Option<Credentials>);

impl StaticCredentials {
    /// Returns a provider with example long-term credentials.
    #[must_use]
    pub fn example() -> Self {
        Self(Some(Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            None,
        )))
    }
}

impl CredentialsProvider for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, CredentialError> {
        self.0.clone().ok_or_else(|| CredentialError::Unavailable {
            reason: "no static credentials configured".to_owned(),
        })
    }
}
