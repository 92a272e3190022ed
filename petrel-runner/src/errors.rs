// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the petrel runner.

use camino::Utf8PathBuf;
use std::{error, fmt, io};
use thiserror::Error;

/// The run was interrupted by an external termination signal.
///
/// Raised from the interrupt-shield checkpoints once SIGHUP, SIGINT or
/// SIGTERM has been caught. By the time this error reaches the caller, the
/// in-flight child (if any) has been killed and its work directory removed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InterruptedError {
    signo: i32,
}

impl InterruptedError {
    pub(crate) fn new(signo: i32) -> Self {
        Self { signo }
    }

    /// The number of the signal that caused the interruption.
    pub fn signal(&self) -> i32 {
        self.signo
    }

    /// Re-delivers the captured signal to the current process with its
    /// default disposition restored, so the process terminates with the wait
    /// status the outside world expects.
    pub fn reraise(&self) -> ! {
        unsafe {
            libc::signal(self.signo, libc::SIG_DFL);
            libc::raise(self.signo);
        }
        // The default disposition of every signal the shield captures is
        // terminal, so this is unreachable unless delivery is blocked.
        std::process::exit(128 + self.signo)
    }
}

impl fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "interrupted by signal {}", self.signo)
    }
}

impl error::Error for InterruptedError {}

/// A systems-level failure while executing a test case.
///
/// None of these variants represent a test outcome: a test that misbehaves
/// is adjudicated into a [`TestResult`](crate::model::TestResult), while a
/// `RunError` means the engine itself could not do its job and the caller
/// must decide whether to abort the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// Installing the signal handlers for the interrupt shield failed.
    #[error("failed to install interrupt handlers")]
    SignalSetup(#[source] io::Error),

    /// The per-test work directory could not be created.
    #[error("failed to create a work directory")]
    Workdir(#[source] io::Error),

    /// The files capturing a child's output could not be set up.
    #[error("failed to set up output capture")]
    OutputSetup(#[source] io::Error),

    /// Spawning the child process failed for a reason other than the test
    /// binary being missing or non-executable (which are test results, not
    /// run errors).
    #[error("failed to spawn `{program}`")]
    Spawn {
        /// The program that could not be spawned.
        program: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Waiting for a child process failed.
    #[error("failed to wait for `{program}`")]
    Wait {
        /// The program being waited for.
        program: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Reading the piped output of a child process failed.
    #[error("failed to read the output of `{program}`")]
    ReadOutput {
        /// The program whose output could not be read.
        program: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The output of a test program's list operation was not valid.
    #[error(transparent)]
    ListParse(#[from] ListParseError),

    /// The run was interrupted by an external signal.
    #[error(transparent)]
    Interrupted(#[from] InterruptedError),
}

/// An error that occurred while parsing the test-case list printed by a
/// test program.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListParseError {
    message: String,
}

impl ListParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ListParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid test case list: {}", self.message)
    }
}

impl error::Error for ListParseError {}

/// An error that occurred while loading the runner configuration.
#[derive(Debug)]
pub struct ConfigLoadError {
    config_file: Utf8PathBuf,
    err: config::ConfigError,
}

impl ConfigLoadError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: config::ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }
}

impl fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "failed to load runner configuration from `{}`",
            self.config_file
        )
    }
}

impl error::Error for ConfigLoadError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.err)
    }
}
