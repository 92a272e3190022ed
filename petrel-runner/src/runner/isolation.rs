// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Child-process isolation.
//!
//! A test child must not observe, nor depend on, the environment of the
//! parent: it gets its own process group (so the whole subtree can be
//! killed with one group signal), a neutral umask, default signal
//! dispositions, a scrubbed locale/timezone environment, and a cwd and
//! `HOME` pointing at its private work directory.
//!
//! Everything that must happen after `fork` but before `exec` runs inside
//! a `pre_exec` hook. Code in that hook executes in the child with the
//! parent's address space snapshot; it is restricted to async-signal-safe
//! libc calls and must not allocate or run any parent-owned destructor.

use camino::Utf8Path;
use std::os::unix::process::CommandExt;
use std::process::Command;

/// Locale and timezone variables scrubbed from the child's environment.
const SCRUBBED_ENV: &[&str] = &[
    "LANG",
    "LC_ALL",
    "LC_COLLATE",
    "LC_CTYPE",
    "LC_MESSAGES",
    "LC_MONETARY",
    "LC_NUMERIC",
    "LC_TIME",
    "TZ",
];

/// Highest signal number whose disposition is reset. Covers the classic
/// range and the realtime signals on the supported platforms.
const LAST_SIGNO: libc::c_int = 64;

/// Applies the full isolation recipe to a command about to be spawned.
pub(crate) fn isolate_command(cmd: &mut Command, work_directory: &Utf8Path) {
    cmd.process_group(0);

    for var in SCRUBBED_ENV {
        cmd.env_remove(var);
    }
    cmd.current_dir(work_directory);
    cmd.env("HOME", work_directory.as_str());

    unsafe {
        cmd.pre_exec(|| {
            libc::umask(0o022);
            reset_signal_dispositions();
            unlimit_core_size();
            Ok(())
        });
    }
}

/// Restores the default disposition of every resettable signal.
///
/// Errors are ignored: some slots are kernel-reserved and cannot be
/// touched, and a partially reset table is still good enough.
fn reset_signal_dispositions() {
    for signo in 1..=LAST_SIGNO {
        if signo == libc::SIGKILL || signo == libc::SIGSTOP {
            continue;
        }
        unsafe {
            libc::signal(signo, libc::SIG_DFL);
        }
    }
}

/// Raises the core-size limit to its hard maximum so crashed tests can
/// leave a core dump behind for debugging.
fn unlimit_core_size() {
    unsafe {
        let mut limit: libc::rlimit = std::mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_CORE, &mut limit) == 0 {
            limit.rlim_cur = limit.rlim_max;
            libc::setrlimit(libc::RLIMIT_CORE, &limit);
        }
    }
}
