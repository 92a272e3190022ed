// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test-case executor.
//!
//! This is the orchestrator that strings the engine together for one test
//! case: requirement gate, interrupt shield, work directory, body phase,
//! optional cleanup phase, result adjudication, and the guaranteed removal
//! of the work directory. One executor runs one test case at a time; a
//! scheduler that wants parallelism runs several executors.

use crate::{
    config::RunnerConfig,
    errors::RunError,
    interface::RESULT_FILE,
    model::{ExitStatus, TestCase, TestProgram, TestResult},
    reqs,
    results,
    runner::{
        supervisor::{self, file_output, OutputSpec, OutputTarget, SpawnSpec},
        workdir::WorkDirectory,
    },
    signal::InterruptShield,
    time::stopwatch,
};
use camino::Utf8PathBuf;
use chrono::{DateTime, Local};
use std::{io, time::Duration};
use tracing::{debug, info, warn};

/// Exit code that means "the harness inside the child declined to run the
/// test". Only honored when the skip cookie file is present; otherwise it
/// is an ordinary exit code.
const SKIP_EXIT_CODE: i32 = 84;

/// File whose presence in the control directory validates
/// [`SKIP_EXIT_CODE`]; its contents are the skip reason.
const SKIPPED_COOKIE: &str = "skipped.txt";

// Control-directory file names for the captured output of each phase.
const BODY_STDOUT: &str = "stdout.txt";
const BODY_STDERR: &str = "stderr.txt";
const CLEANUP_STDOUT: &str = "cleanup-stdout.txt";
const CLEANUP_STDERR: &str = "cleanup-stderr.txt";

/// Whether the executor converts termination signals into cooperative
/// cancellation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ShieldMode {
    Standard,
    Disabled,
}

/// Executes individual test cases.
#[derive(Clone, Debug)]
pub struct Executor {
    shield_mode: ShieldMode,
    stdout_path: Option<Utf8PathBuf>,
    stderr_path: Option<Utf8PathBuf>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// Creates an executor with standard interrupt handling: SIGHUP,
    /// SIGINT and SIGTERM abort the test case in an orderly fashion and
    /// surface as [`RunError::Interrupted`].
    pub fn new() -> Self {
        Self {
            shield_mode: ShieldMode::Standard,
            stdout_path: None,
            stderr_path: None,
        }
    }

    /// Creates an executor that leaves signal handling to the embedder.
    pub fn without_interrupt_handling() -> Self {
        Self {
            shield_mode: ShieldMode::Disabled,
            stdout_path: None,
            stderr_path: None,
        }
    }

    /// Redirects the body's stdout to the given path instead of a file in
    /// the work directory. `/dev/stdout` means "inherit the runner's own
    /// stdout".
    pub fn set_stdout_path(&mut self, path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.stdout_path = Some(path.into());
        self
    }

    /// Redirects the body's stderr, like
    /// [`set_stdout_path`](Self::set_stdout_path).
    pub fn set_stderr_path(&mut self, path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.stderr_path = Some(path.into());
        self
    }

    fn shield(&self) -> Result<InterruptShield, RunError> {
        match self.shield_mode {
            ShieldMode::Standard => InterruptShield::new(),
            ShieldMode::Disabled => Ok(InterruptShield::noop()),
        }
    }

    /// Runs a single test case to completion and adjudicates its outcome.
    ///
    /// Always returns a result for the test unless the engine itself
    /// failed (spawn/pipe/directory errors) or the run was interrupted; in
    /// both of those cases any in-flight child has been killed and the
    /// work directory removed before the error propagates.
    pub async fn execute(
        &self,
        program: &TestProgram,
        test_case: &TestCase,
        config: &RunnerConfig,
    ) -> Result<ExecutionSummary, RunError> {
        let clock = stopwatch();
        info!(
            id = %program.case_id(test_case),
            interface = %program.interface(),
            "running test case"
        );

        if let Some(fake) = test_case.fake_result() {
            debug!("test case carries a pre-recorded result");
            return Ok(ExecutionSummary::new(fake.clone(), &clock));
        }

        if let Some(reason) =
            reqs::check_requirements(test_case.metadata(), config, program.test_suite())
        {
            debug!(%reason, "requirements not met");
            return Ok(ExecutionSummary::new(TestResult::Skipped(reason), &clock));
        }

        let mut shield = self.shield()?;
        let result = self
            .execute_in_workdir(program, test_case, config, &mut shield)
            .await?;

        info!(id = %program.case_id(test_case), %result, "test case finished");
        Ok(ExecutionSummary::new(result, &clock))
    }

    /// The portion of the execution that owns a work directory. The
    /// directory is removed on every exit path: explicitly on the success
    /// path (so removal failures can demote the result) and by the scoped
    /// handle when an error unwinds.
    async fn execute_in_workdir(
        &self,
        program: &TestProgram,
        test_case: &TestCase,
        config: &RunnerConfig,
        shield: &mut InterruptShield,
    ) -> Result<TestResult, RunError> {
        let interface = program.interface();
        let timeout = test_case.metadata().timeout();
        let workdir = WorkDirectory::new().map_err(RunError::Workdir)?;
        shield.check()?;

        let result_file = workdir.control().join(RESULT_FILE);
        let body_spec = SpawnSpec {
            program: program.absolute_path(),
            args: interface.body_args(program, test_case, config, &result_file),
            work_directory: workdir.work().to_owned(),
            env: interface.child_env(),
            output: self.body_output(&workdir),
        };

        let body = self.run_phase(body_spec, timeout, shield).await?;
        shield.check()?;

        // The skip cookie means the harness in the child never reached the
        // test proper; there is nothing to clean up.
        let early_result = match &body {
            PhaseOutcome::ExecFailure(reason) => Some(TestResult::Broken(reason.clone())),
            PhaseOutcome::Status(status) => self.read_skip_cookie(&workdir, status.as_ref()),
        };

        let mut cleanup_status = None;
        let run_cleanup = early_result.is_none() && test_case.metadata().has_cleanup();
        if run_cleanup {
            if let Some(args) = interface.cleanup_args(program, test_case, config) {
                let cleanup_spec = SpawnSpec {
                    program: program.absolute_path(),
                    args,
                    work_directory: workdir.work().to_owned(),
                    env: interface.child_env(),
                    output: file_output(
                        workdir.control().join(CLEANUP_STDOUT),
                        workdir.control().join(CLEANUP_STDERR),
                    ),
                };
                debug!(id = %program.case_id(test_case), "running cleanup phase");
                match self.run_phase(cleanup_spec, timeout, shield).await? {
                    // An unspawnable cleanup is indistinguishable from one
                    // that failed to terminate successfully.
                    PhaseOutcome::ExecFailure(_) => cleanup_status = Some(None),
                    PhaseOutcome::Status(status) => cleanup_status = Some(status),
                }
                shield.check()?;
            }
        }

        let mut result = match early_result {
            Some(result) => result,
            None => match &body {
                PhaseOutcome::ExecFailure(reason) => TestResult::Broken(reason.clone()),
                PhaseOutcome::Status(status) => {
                    interface.compute_result(status.as_ref(), &result_file)
                }
            },
        };

        if run_cleanup {
            if let Some(status) = &cleanup_status {
                result = results::apply_cleanup(result, status.as_ref());
            }
        }

        match workdir.cleanup() {
            Ok(()) => {}
            Err(err) if result.good() => {
                result =
                    TestResult::Broken(format!("Could not clean up test work directory: {err}"));
            }
            Err(err) => {
                warn!("failed to clean up test work directory: {err}");
            }
        }
        shield.check()?;

        Ok(result)
    }

    fn body_output(&self, workdir: &WorkDirectory) -> OutputSpec {
        let stdout = match &self.stdout_path {
            Some(path) => OutputTarget::for_path(path.clone()),
            None => OutputTarget::File(workdir.control().join(BODY_STDOUT)),
        };
        let stderr = match &self.stderr_path {
            Some(path) => OutputTarget::for_path(path.clone()),
            None => OutputTarget::File(workdir.control().join(BODY_STDERR)),
        };
        OutputSpec::Files { stdout, stderr }
    }

    /// Spawns one phase and waits for it under the deadline.
    ///
    /// A missing or non-executable test binary is evidence about the test,
    /// not an engine failure, so it comes back as an exec-failure outcome;
    /// every other spawn problem propagates.
    async fn run_phase(
        &self,
        spec: SpawnSpec,
        timeout: Duration,
        shield: &mut InterruptShield,
    ) -> Result<PhaseOutcome, RunError> {
        let mut child = match supervisor::spawn(spec) {
            Ok(child) => child,
            Err(RunError::Spawn { program, source }) if is_exec_failure(&source) => {
                return Ok(PhaseOutcome::ExecFailure(format!(
                    "Failed to execute {program}: {source}"
                )));
            }
            Err(err) => return Err(err),
        };
        let status = child.wait_with_deadline(timeout, shield).await?;
        Ok(PhaseOutcome::Status(status))
    }

    /// Interprets the skip-cookie protocol: exit code 84 plus a cookie
    /// file means the child-side gate declined to run the test.
    fn read_skip_cookie(
        &self,
        workdir: &WorkDirectory,
        status: Option<&ExitStatus>,
    ) -> Option<TestResult> {
        if status != Some(&ExitStatus::Exited(SKIP_EXIT_CODE)) {
            return None;
        }
        let cookie = workdir.control().join(SKIPPED_COOKIE);
        match std::fs::read_to_string(&cookie) {
            Ok(reason) => Some(TestResult::Skipped(reason.trim_end().to_owned())),
            // No cookie: the test program really did exit with that code.
            Err(_) => None,
        }
    }
}

/// What happened to one spawned phase.
#[derive(Clone, Debug)]
enum PhaseOutcome {
    /// The child ran; `None` means it hit the deadline.
    Status(Option<ExitStatus>),
    /// The binary could not be executed at all.
    ExecFailure(String),
}

fn is_exec_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}

/// A finished execution: the adjudicated result plus timing information.
#[derive(Clone, Debug)]
pub struct ExecutionSummary {
    result: TestResult,
    start_time: DateTime<Local>,
    end_time: DateTime<Local>,
    duration: Duration,
}

impl ExecutionSummary {
    fn new(result: TestResult, clock: &crate::time::StopwatchStart) -> Self {
        let snapshot = clock.snapshot();
        Self {
            result,
            start_time: snapshot.start_time,
            end_time: snapshot.end_time(),
            duration: snapshot.duration,
        }
    }

    /// The adjudicated result of the test case.
    pub fn result(&self) -> &TestResult {
        &self.result
    }

    /// Consumes the summary, returning just the result.
    pub fn into_result(self) -> TestResult {
        self.result
    }

    /// When the execution started.
    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    /// When the execution finished.
    pub fn end_time(&self) -> DateTime<Local> {
        self.end_time
    }

    /// How long the execution took, measured on the monotonic clock.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}
