// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The child supervisor: spawning, deadline waits and group teardown.
//!
//! Each child is spawned as the leader of a fresh process group (see
//! [`isolation`]), so teardown is always a single `kill(-pgid, SIGKILL)`
//! that takes the whole subtree with it. The wait primitive returns
//! `Some(status)` for a child that terminated on its own and `None` for one
//! that had to be killed at the deadline; an interrupt observed while
//! waiting tears the child down and surfaces as an error instead.

use crate::{
    errors::RunError,
    model::ExitStatus,
    runner::isolation,
    signal::InterruptShield,
};
use camino::Utf8PathBuf;
use std::{
    io,
    os::unix::fs::OpenOptionsExt,
    process::{Command, Stdio},
    time::Duration,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Paths that mean "inherit the parent's descriptor" rather than "open
/// this file". Matched by path equality, never by opening the device.
const INHERIT_STDOUT: &str = "/dev/stdout";
const INHERIT_STDERR: &str = "/dev/stderr";

/// Where one of the child's output streams goes.
#[derive(Clone, Debug)]
pub(crate) enum OutputTarget {
    /// Write to this file, created with mode 0644 and truncated if present.
    File(Utf8PathBuf),
    /// Share the parent's descriptor.
    Inherit,
}

impl OutputTarget {
    /// Maps a caller-supplied path to a target, honoring the special
    /// `/dev/stdout` and `/dev/stderr` spellings.
    pub(crate) fn for_path(path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        if path == INHERIT_STDOUT || path == INHERIT_STDERR {
            OutputTarget::Inherit
        } else {
            OutputTarget::File(path)
        }
    }

    fn to_stdio(&self) -> io::Result<Stdio> {
        match self {
            OutputTarget::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(0o644)
                    .open(path)?;
                Ok(file.into())
            }
            OutputTarget::Inherit => Ok(Stdio::inherit()),
        }
    }
}

/// How the child's stdout and stderr are captured.
#[derive(Clone, Debug)]
pub(crate) enum OutputSpec {
    /// Redirect each stream to its own target.
    Files {
        stdout: OutputTarget,
        stderr: OutputTarget,
    },
    /// Capture both streams through internal pipes, to be collected with
    /// [`RunningChild::wait_with_output`].
    Piped,
}

/// Everything needed to spawn one phase of a test case.
#[derive(Clone, Debug)]
pub(crate) struct SpawnSpec {
    /// Absolute path to the program to execute.
    pub(crate) program: Utf8PathBuf,
    pub(crate) args: Vec<String>,
    /// Directory the child runs in; also becomes its `HOME`.
    pub(crate) work_directory: Utf8PathBuf,
    /// Extra environment variables, applied after the isolation scrub.
    pub(crate) env: Vec<(String, String)>,
    pub(crate) output: OutputSpec,
}

/// A spawned child plus the handle needed to kill its process group.
#[derive(Debug)]
pub(crate) struct RunningChild {
    program: Utf8PathBuf,
    child: tokio::process::Child,
    pid: libc::pid_t,
}

/// Spawns a child per `spec`, fully isolated.
pub(crate) fn spawn(spec: SpawnSpec) -> Result<RunningChild, RunError> {
    let mut cmd = Command::new(spec.program.as_str());
    cmd.args(&spec.args);
    isolation::isolate_command(&mut cmd, &spec.work_directory);
    for (name, value) in &spec.env {
        cmd.env(name, value);
    }
    cmd.stdin(Stdio::null());

    match &spec.output {
        OutputSpec::Files { stdout, stderr } => {
            cmd.stdout(stdout.to_stdio().map_err(RunError::OutputSetup)?);
            cmd.stderr(stderr.to_stdio().map_err(RunError::OutputSetup)?);
        }
        OutputSpec::Piped => {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
        }
    }

    let mut cmd: tokio::process::Command = cmd.into();
    let child = cmd.spawn().map_err(|source| RunError::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    let pid = child.id().expect("child was just spawned") as libc::pid_t;
    debug!(program = %spec.program, pid, "spawned test child");

    Ok(RunningChild {
        program: spec.program,
        child,
        pid,
    })
}

impl RunningChild {
    /// Waits for the child with a wall-clock deadline.
    ///
    /// Returns `Some(status)` if the child terminated in time and `None`
    /// if the deadline expired, in which case the whole process group has
    /// been killed and reaped. An interrupt caught while waiting also
    /// kills the group before the error propagates, so no zombie survives
    /// either exit path.
    pub(crate) async fn wait_with_deadline(
        &mut self,
        timeout: Duration,
        shield: &mut InterruptShield,
    ) -> Result<Option<ExitStatus>, RunError> {
        tokio::select! {
            res = self.child.wait() => {
                let status = res.map_err(|source| RunError::Wait {
                    program: self.program.clone(),
                    source,
                })?;
                Ok(Some(status.into()))
            }
            () = tokio::time::sleep(timeout) => {
                warn!(program = %self.program, ?timeout, "deadline expired; killing process group");
                self.kill_group();
                self.reap().await;
                Ok(None)
            }
            err = shield.recv() => {
                debug!(program = %self.program, "interrupted while waiting; killing process group");
                self.kill_group();
                self.reap().await;
                Err(err.into())
            }
        }
    }

    /// Waits like [`wait_with_deadline`](Self::wait_with_deadline) while
    /// collecting the piped output. Requires [`OutputSpec::Piped`].
    pub(crate) async fn wait_with_output(
        mut self,
        timeout: Duration,
        shield: &mut InterruptShield,
    ) -> Result<(Option<ExitStatus>, ChildOutput), RunError> {
        let stdout = self
            .child
            .stdout
            .take()
            .expect("child was spawned with piped output");
        let stderr = self
            .child
            .stderr
            .take()
            .expect("child was spawned with piped output");
        let stdout_reader = tokio::spawn(read_to_string(stdout));
        let stderr_reader = tokio::spawn(read_to_string(stderr));

        let status = self.wait_with_deadline(timeout, shield).await?;

        // The group is dead or reaped by now, so both pipes have hit EOF
        // and the readers cannot block.
        let stdout = stdout_reader
            .await
            .expect("output reader does not panic")
            .map_err(|source| self.read_output_error(source))?;
        let stderr = stderr_reader
            .await
            .expect("output reader does not panic")
            .map_err(|source| self.read_output_error(source))?;

        Ok((status, ChildOutput { stdout, stderr }))
    }

    fn read_output_error(&self, source: io::Error) -> RunError {
        RunError::ReadOutput {
            program: self.program.clone(),
            source,
        }
    }

    /// Delivers SIGKILL to the child's whole process group.
    pub(crate) fn kill_group(&self) {
        unsafe {
            libc::kill(-self.pid, libc::SIGKILL);
        }
    }

    async fn reap(&mut self) {
        if let Err(err) = self.child.wait().await {
            warn!(program = %self.program, "failed to reap killed child: {err}");
        }
    }
}

/// The collected output of a piped child.
#[derive(Clone, Debug)]
pub(crate) struct ChildOutput {
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

async fn read_to_string<R>(mut reader: R) -> io::Result<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Builds an [`OutputSpec`] from two caller-supplied paths, honoring the
/// inherit spellings.
pub(crate) fn file_output(stdout: impl Into<Utf8PathBuf>, stderr: impl Into<Utf8PathBuf>) -> OutputSpec {
    OutputSpec::Files {
        stdout: OutputTarget::for_path(stdout),
        stderr: OutputTarget::for_path(stderr),
    }
}
