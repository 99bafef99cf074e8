//! Spawns `systemctl` and `cryptsetup` with a hard timeout. Callers only look
//! at the exit status; captured output is kept for diagnostics.

use log::debug;
use mollyguard_core::error::{MollyguardError, MollyguardResult};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
/// Wraps a concrete binary path and the timeout applied to every call.
pub struct CommandRunner {
    path: PathBuf,
    timeout: Duration,
}

#[derive(Debug)]
/// Collects stdout, stderr, and exit status from a finished command.
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl Output {
    /// stderr if the command wrote any, stdout otherwise.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

impl CommandRunner {
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self { path, timeout }
    }

    /// Execute the binary with captured stdout/stderr and an optional stdin payload.
    pub fn run(&self, args: &[&str], input: Option<&[u8]>) -> MollyguardResult<Output> {
        let mut command = Command::new(&self.path);
        command.args(args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        if input.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }

        let mut child = self.spawn(&mut command)?;

        if let Some(bytes) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(bytes)?;
                stdin.flush().ok();
            }
        }

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        self.wait_with_timeout(child, stdout_pipe, stderr_pipe)
    }

    /// Execute the binary with the caller's stdin and stderr attached, so the
    /// tool can prompt the operator directly.
    pub fn run_attached(&self, args: &[&str]) -> MollyguardResult<Output> {
        let mut command = Command::new(&self.path);
        command.args(args);
        command.stdin(Stdio::inherit());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::inherit());

        let mut child = self.spawn(&mut command)?;
        let stdout_pipe = child.stdout.take();
        self.wait_with_timeout(child, stdout_pipe, None)
    }

    /// Like `run` without stdin, turning a nonzero exit into `CommandFailed`.
    pub fn run_checked(&self, args: &[&str]) -> MollyguardResult<Output> {
        let out = self.run(args, None)?;
        self.check(args, out)
    }

    pub(crate) fn check(&self, args: &[&str], out: Output) -> MollyguardResult<Output> {
        if out.status != 0 {
            debug!(
                "{} {} exited with {}: {}",
                self.path.display(),
                args.join(" "),
                out.status,
                out.diagnostic()
            );
            return Err(self.failure(args, out.status));
        }
        Ok(out)
    }

    pub(crate) fn failure(&self, args: &[&str], status: i32) -> MollyguardError {
        MollyguardError::CommandFailed {
            binary: self.path.clone(),
            args: args.join(" "),
            status,
        }
    }

    fn spawn(&self, command: &mut Command) -> MollyguardResult<Child> {
        command.spawn().map_err(|source| MollyguardError::Spawn {
            binary: self.path.clone(),
            source,
        })
    }

    /// Wait for the child until it finishes or exceeds the configured timeout.
    fn wait_with_timeout(
        &self,
        mut child: Child,
        stdout_pipe: Option<ChildStdout>,
        stderr_pipe: Option<ChildStderr>,
    ) -> MollyguardResult<Output> {
        let start = Instant::now();
        let stdout_handle = Self::spawn_output_reader(stdout_pipe);
        let stderr_handle = Self::spawn_output_reader(stderr_pipe);
        let mut exit_status = None;

        while start.elapsed() <= self.timeout {
            if let Some(status) = child.try_wait()? {
                exit_status = Some(status);
                break;
            }
            thread::sleep(Duration::from_millis(25));
        }

        let Some(exit_status) = exit_status else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MollyguardError::Timeout {
                binary: self.path.clone(),
                timeout: self.timeout,
            });
        };

        let stdout = stdout_handle
            .join()
            .map_err(|_| reader_panicked("stdout"))??;
        let stderr = stderr_handle
            .join()
            .map_err(|_| reader_panicked("stderr"))??;

        Ok(Output {
            stdout,
            stderr,
            status: exit_status.code().unwrap_or(-1),
        })
    }

    /// Spin up a helper thread to drain a pipe and return the collected text.
    fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<MollyguardResult<String>>
    where
        R: Read + Send + 'static,
    {
        thread::spawn(move || -> MollyguardResult<String> {
            if let Some(mut reader) = pipe {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(String::from_utf8_lossy(&buf).to_string())
            } else {
                Ok(String::new())
            }
        })
    }
}

fn reader_panicked(stream: &str) -> MollyguardError {
    MollyguardError::Io(std::io::Error::other(format!(
        "{stream} reader thread panicked"
    )))
}
