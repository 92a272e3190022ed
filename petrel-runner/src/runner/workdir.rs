// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test work directories.
//!
//! Every test case gets a unique directory under `$TMPDIR` (or `/tmp`).
//! Its top level belongs to the engine: result files, captured output and
//! the skip cookie live there. The child itself runs inside the `work/`
//! subdirectory so that whatever the test does to its cwd cannot clobber
//! those control files.

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use std::io;
use tracing::debug;

/// Prefix of every work directory the engine creates.
const WORKDIR_PREFIX: &str = "petrel.";

/// Name of the subdirectory tests run in.
const WORK_SUBDIR: &str = "work";

/// A scoped per-test scratch directory.
///
/// Dropping the handle removes the whole tree, so the directory disappears
/// on every control-flow exit. Callers that care about removal failures
/// (they can demote a good test result) call [`WorkDirectory::cleanup`]
/// explicitly instead of relying on the drop.
#[derive(Debug)]
pub(crate) struct WorkDirectory {
    dir: Utf8TempDir,
    work: Utf8PathBuf,
}

impl WorkDirectory {
    /// Creates a fresh work directory with its `work/` subdirectory.
    pub(crate) fn new() -> io::Result<Self> {
        let dir = camino_tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir()?;
        let work = dir.path().join(WORK_SUBDIR);
        std::fs::create_dir(&work)?;
        debug!(path = %dir.path(), "created work directory");
        Ok(Self { dir, work })
    }

    /// The control directory, owned by the engine.
    pub(crate) fn control(&self) -> &Utf8Path {
        self.dir.path()
    }

    /// The directory handed to the child as cwd and `HOME`.
    pub(crate) fn work(&self) -> &Utf8Path {
        &self.work
    }

    /// Removes the tree, reporting failures to the caller.
    pub(crate) fn cleanup(self) -> io::Result<()> {
        debug!(path = %self.dir.path(), "removing work directory");
        self.dir.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_unique_directories_with_work_subdir() {
        let a = WorkDirectory::new().unwrap();
        let b = WorkDirectory::new().unwrap();
        assert_ne!(a.control(), b.control());
        assert!(a.work().is_dir());
        assert_eq!(a.work(), a.control().join(WORK_SUBDIR));
        assert!(a
            .control()
            .file_name()
            .unwrap()
            .starts_with(WORKDIR_PREFIX));
    }

    #[test]
    fn cleanup_removes_the_tree() {
        let wd = WorkDirectory::new().unwrap();
        let control = wd.control().to_owned();
        std::fs::write(wd.work().join("leftover.txt"), b"data").unwrap();
        wd.cleanup().unwrap();
        assert!(!control.exists());
    }

    #[test]
    fn drop_removes_the_tree() {
        let control = {
            let wd = WorkDirectory::new().unwrap();
            wd.control().to_owned()
        };
        assert!(!control.exists());
    }

    #[test]
    fn honors_tmpdir() {
        // TMPDIR is read through std's temp_dir; just pin down the parent
        // relationship so the contract stays visible.
        let wd = WorkDirectory::new().unwrap();
        assert_eq!(
            wd.control().parent().unwrap().as_std_path(),
            std::env::temp_dir().as_path()
        );
    }
}
