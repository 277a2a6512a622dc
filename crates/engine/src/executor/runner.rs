use std::{
    collections::HashMap,
    io::{self, ErrorKind},
    path::PathBuf,
    process::Stdio,
};

use stepwise_util::{block_on_future, redact_environment, redact_sensitive};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, trace};

/// Everything the spawning primitive needs to run one process step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    /// Rendered command line, handed to the platform shell.
    pub command: String,
    /// Working directory, or `None` to inherit the caller's.
    pub working_directory: Option<PathBuf>,
    /// Complete child environment. Nothing else is inherited.
    pub environment: HashMap<String, String>,
    /// Rendered stdin text.
    pub stdin: Option<String>,
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execute a single process invocation.
///
/// Hosts can provide implementations that sandbox, record, or fake execution. The
/// default [`ShellProcessRunner`] spawns a real child through the platform shell.
pub trait ProcessRunner {
    /// Run the invocation to completion and capture its output.
    ///
    /// A nonzero exit is reported through [`ProcessOutput::exit_code`], not as an error;
    /// errors are reserved for failures to spawn or communicate with the child.
    fn run(&self, invocation: &ProcessInvocation) -> io::Result<ProcessOutput>;
}

/// Runner that executes commands with `/bin/sh -c` (or `cmd /C` on Windows).
///
/// The child environment is cleared and replaced with the invocation's environment.
/// Stdin is written while stdout and stderr are drained, so large payloads in either
/// direction cannot deadlock. No timeout is imposed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellProcessRunner;

impl ProcessRunner for ShellProcessRunner {
    fn run(&self, invocation: &ProcessInvocation) -> io::Result<ProcessOutput> {
        debug!(
            command = %loggable_command(invocation),
            working_directory = ?invocation.working_directory,
            has_stdin = invocation.stdin.is_some(),
            "spawning process"
        );
        trace!(environment = ?redact_environment(&invocation.environment), "process environment");

        block_on_future(spawn_and_capture(invocation))
    }
}

/// Command line as it may appear in logs, with secret-looking assignments masked.
fn loggable_command(invocation: &ProcessInvocation) -> String {
    redact_sensitive(&invocation.command)
}

async fn spawn_and_capture(invocation: &ProcessInvocation) -> io::Result<ProcessOutput> {
    let mut command = shell_command(&invocation.command);
    command
        .env_clear()
        .envs(&invocation.environment)
        .stdin(if invocation.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(working_directory) = &invocation.working_directory {
        command.current_dir(working_directory);
    }

    let mut child = command.spawn()?;
    let stdin_pipe = child.stdin.take();
    let stdin_text = invocation.stdin.as_deref();

    let write_stdin = async move {
        if let (Some(mut pipe), Some(text)) = (stdin_pipe, stdin_text) {
            match pipe.write_all(text.as_bytes()).await {
                // The child may exit without reading its input
                Err(error) if error.kind() == ErrorKind::BrokenPipe => {}
                Err(error) => return Err(error),
                Ok(()) => {}
            }
        }
        Ok(())
    };

    let (write_result, output) = tokio::join!(write_stdin, child.wait_with_output());
    let output = output?;
    write_result?;

    Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

#[cfg(not(windows))]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(command_line);
    command
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(command_line);
    command
}
