//! Host command execution.
//!
//! Every interaction with the package manager, the service manager, and
//! `fuser` goes through [`CommandExecutor`] so tests can substitute scripted
//! outputs for real processes.

use std::io;
use std::process::{Command, Output};

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// A non-zero exit status is reported through [`Output::status`], not as
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns any I/O error encountered while spawning or waiting for the
    /// command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chronicle_installer::executor::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("rpm", &["-q", "rpm"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), std::io::Error>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        log::debug!("running {cmd} {}", args.join(" "));
        Command::new(cmd).args(args).output()
    }
}

/// Returns stdout followed by stderr as lossily decoded text.
///
/// Package-manager diagnostics land on either stream depending on the verb,
/// so signature matching always looks at both.
///
/// # Examples
///
/// ```
/// use chronicle_installer::executor::combined_output;
/// use std::process::Output;
///
/// # #[cfg(unix)]
/// # {
/// use std::os::unix::process::ExitStatusExt;
/// let output = Output {
///     status: std::process::ExitStatus::from_raw(0),
///     stdout: b"out\n".to_vec(),
///     stderr: b"err\n".to_vec(),
/// };
/// assert_eq!(combined_output(&output), "out\nerr\n");
/// # }
/// ```
#[must_use]
pub fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}
