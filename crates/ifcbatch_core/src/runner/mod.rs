//! External converter invocation.
//!
//! The actual conversion happens in a separate host process driven by
//! a runner executable. This module builds the command line for one
//! version bucket, streams the child's output into the log, and
//! enforces a wall-clock timeout by killing the child. One bucket's
//! failure never touches another bucket's run.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// How often the child is polled while waiting for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn converter '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait on converter: {0}")]
    Wait(#[from] std::io::Error),

    #[error("Converter exceeded the {timeout_secs}s timeout and was killed")]
    Timeout { timeout_secs: u64 },
}

/// Outcome of one bucket run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Process exit code; -1 when the process died without one.
    pub exit_code: i32,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Builds and runs the converter command for a version bucket.
pub struct ConverterRunner {
    program: String,
    script: PathBuf,
    /// Zero disables the timeout.
    timeout_secs: u64,
    debug: bool,
}

impl ConverterRunner {
    pub fn new(program: impl Into<String>, script: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            timeout_secs,
            debug: false,
        }
    }

    /// Forward a debug flag to the converter.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Command line for one bucket, without running it.
    fn command(&self, manifest: &Path, version: i32) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("run")
            .arg(&self.script)
            .arg("--models")
            .arg(manifest)
            .arg("--version")
            .arg(version.to_string());
        if self.debug {
            cmd.arg("--debug");
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }

    /// Run the converter for one bucket, blocking until it exits or
    /// the timeout fires.
    ///
    /// Child output is streamed line by line into the log as it
    /// arrives. On timeout the child is killed and the bucket is a
    /// hard failure.
    pub fn run(&self, manifest: &Path, version: i32) -> Result<RunOutcome, RunnerError> {
        let mut cmd = self.command(manifest, version);
        tracing::info!(version, manifest = %manifest.display(), "launching converter: {cmd:?}");

        let mut child = cmd.spawn().map_err(|e| RunnerError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        let stdout_reader = child.stdout.take().map(|s| spawn_line_logger(s, version, false));
        let stderr_reader = child.stderr.take().map(|s| spawn_line_logger(s, version, true));

        let status = self.wait_with_timeout(&mut child)?;

        for handle in [stdout_reader, stderr_reader].into_iter().flatten() {
            // Reader threads end when the child's pipes close.
            let _ = handle.join();
        }

        let exit_code = status.unwrap_or(-1);
        tracing::info!(version, exit_code, "converter finished");
        Ok(RunOutcome { exit_code })
    }

    /// Poll until exit or deadline; returns the exit code if any.
    fn wait_with_timeout(&self, child: &mut Child) -> Result<Option<i32>, RunnerError> {
        let deadline = (self.timeout_secs > 0)
            .then(|| Instant::now() + Duration::from_secs(self.timeout_secs));

        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status.code());
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    tracing::error!(
                        timeout_secs = self.timeout_secs,
                        "converter timed out, killing"
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunnerError::Timeout {
                        timeout_secs: self.timeout_secs,
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Stream a child pipe into the log, one line at a time.
fn spawn_line_logger<R: Read + Send + 'static>(
    pipe: R,
    version: i32,
    is_stderr: bool,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(pipe).lines() {
            match line {
                Ok(line) if !line.trim().is_empty() => {
                    if is_stderr {
                        tracing::warn!(version, "converter: {line}");
                    } else {
                        tracing::info!(version, "converter: {line}");
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    })
}
