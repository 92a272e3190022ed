// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The requirement gate: evaluation of a test case's preconditions.
//!
//! The gate runs in the parent before any child is forked. A failed check
//! is not an error; it produces the skip reason the executor turns into a
//! `Skipped` result.

use crate::{
    config::RunnerConfig,
    model::{RequiredUser, TestMetadata},
};
use camino::Utf8Path;
use std::path::PathBuf;

/// Checks a test case's requirements against the current environment and
/// configuration.
///
/// Returns `None` when every requirement holds, or `Some(reason)` naming
/// the first requirement that does not. Checks run in a fixed order and
/// short-circuit on the first failure.
pub fn check_requirements(
    metadata: &TestMetadata,
    config: &RunnerConfig,
    test_suite: &str,
) -> Option<String> {
    for name in metadata.required_configs() {
        if !config.is_property_defined(test_suite, name) {
            return Some(format!(
                "Required configuration property '{name}' not defined"
            ));
        }
    }

    if !metadata.allowed_architectures().is_empty()
        && !metadata
            .allowed_architectures()
            .contains(config.architecture())
    {
        return Some(format!(
            "Current architecture '{}' not supported",
            config.architecture()
        ));
    }

    if !metadata.allowed_platforms().is_empty()
        && !metadata.allowed_platforms().contains(config.platform())
    {
        return Some(format!(
            "Current platform '{}' not supported",
            config.platform()
        ));
    }

    match metadata.required_user() {
        RequiredUser::Any => {}
        RequiredUser::Root => {
            if !running_as_root() {
                return Some("Requires root privileges".to_owned());
            }
        }
        RequiredUser::Unprivileged => {
            if running_as_root() && config.unprivileged_user().is_none() {
                return Some(
                    "Requires an unprivileged user but the unprivileged-user configuration \
                     variable is not defined"
                        .to_owned(),
                );
            }
        }
    }

    for file in metadata.required_files() {
        debug_assert!(file.is_absolute(), "required files must be absolute");
        if !file.exists() {
            return Some(format!("Required file '{file}' not found"));
        }
    }

    for program in metadata.required_programs() {
        if program.is_absolute() {
            if !program.exists() {
                return Some(format!("Required program '{program}' not found"));
            }
        } else if find_in_path(program).is_none() {
            return Some(format!("Required program '{program}' not found in PATH"));
        }
    }

    if metadata.required_memory() > 0 {
        let available = physical_memory();
        // 0 means the query is unsupported here; be permissive rather than
        // skipping every memory-constrained test.
        if available > 0 && available < metadata.required_memory() {
            return Some(format!(
                "Requires {} bytes of physical memory but only {} available",
                metadata.required_memory(),
                available
            ));
        }
    }

    None
}

fn running_as_root() -> bool {
    // Effective, not real: what matters is what the test will be able to do.
    unsafe { libc::geteuid() == 0 }
}

fn find_in_path(program: &Utf8Path) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program.as_std_path()))
        .find(|candidate| candidate.exists())
}

/// Total physical memory in bytes, or 0 when the query is unsupported.
pub(crate) fn physical_memory() -> u64 {
    os::physical_memory()
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod os {
            pub(super) fn physical_memory() -> u64 {
                let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
                let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
                if pages <= 0 || page_size <= 0 {
                    0
                } else {
                    (pages as u64).saturating_mul(page_size as u64)
                }
            }
        }
    } else if #[cfg(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly",
    ))] {
        mod os {
            #[cfg(target_os = "macos")]
            const MIB: [libc::c_int; 2] = [libc::CTL_HW, libc::HW_MEMSIZE];
            #[cfg(not(target_os = "macos"))]
            const MIB: [libc::c_int; 2] = [libc::CTL_HW, libc::HW_PHYSMEM];

            pub(super) fn physical_memory() -> u64 {
                let mut mib = MIB;
                let mut value: u64 = 0;
                let mut len = std::mem::size_of::<u64>();
                let res = unsafe {
                    libc::sysctl(
                        mib.as_mut_ptr(),
                        mib.len() as libc::c_uint,
                        &mut value as *mut u64 as *mut libc::c_void,
                        &mut len,
                        std::ptr::null_mut(),
                        0,
                    )
                };
                if res == -1 {
                    0
                } else {
                    value
                }
            }
        }
    } else {
        mod os {
            pub(super) fn physical_memory() -> u64 {
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestMetadata;

    fn config() -> RunnerConfig {
        RunnerConfig::default()
    }

    #[test]
    fn no_requirements_pass() {
        let metadata = TestMetadata::default();
        assert_eq!(check_requirements(&metadata, &config(), "suite"), None);
    }

    #[test]
    fn required_config_missing() {
        let metadata = TestMetadata::builder().add_required_config("magic_var").build();
        assert_eq!(
            check_requirements(&metadata, &config(), "suite"),
            Some("Required configuration property 'magic_var' not defined".to_owned())
        );
    }

    #[test]
    fn required_config_present() {
        let metadata = TestMetadata::builder().add_required_config("magic_var").build();
        let mut config = config();
        config.set_suite_var("suite", "magic_var", "yes");
        assert_eq!(check_requirements(&metadata, &config, "suite"), None);
    }

    #[test]
    fn required_config_unprivileged_user_alias() {
        let metadata = TestMetadata::builder()
            .add_required_config("unprivileged-user")
            .build();
        let mut config = config();
        assert_eq!(
            check_requirements(&metadata, &config, "suite"),
            Some(
                "Required configuration property 'unprivileged-user' not defined".to_owned()
            )
        );
        config.set_unprivileged_user("nobody");
        assert_eq!(check_requirements(&metadata, &config, "suite"), None);
    }

    #[test]
    fn architecture_mismatch() {
        let metadata = TestMetadata::builder()
            .add_allowed_architecture("macppc-arch")
            .build();
        let mut config = config();
        config.set_architecture("some-arch");
        assert_eq!(
            check_requirements(&metadata, &config, "suite"),
            Some("Current architecture 'some-arch' not supported".to_owned())
        );
    }

    #[test]
    fn architecture_match() {
        let mut config = config();
        config.set_architecture("some-arch");
        let metadata = TestMetadata::builder()
            .add_allowed_architecture("another-arch")
            .add_allowed_architecture("some-arch")
            .build();
        assert_eq!(check_requirements(&metadata, &config, "suite"), None);
    }

    #[test]
    fn platform_mismatch() {
        let metadata = TestMetadata::builder()
            .add_allowed_platform("i386")
            .add_allowed_platform("amd64")
            .build();
        let mut config = config();
        config.set_platform("macppc");
        assert_eq!(
            check_requirements(&metadata, &config, "suite"),
            Some("Current platform 'macppc' not supported".to_owned())
        );
    }

    #[test]
    fn root_requirement_follows_euid() {
        let metadata = TestMetadata::builder()
            .set_required_user(RequiredUser::Root)
            .build();
        let expected = if unsafe { libc::geteuid() } == 0 {
            None
        } else {
            Some("Requires root privileges".to_owned())
        };
        assert_eq!(check_requirements(&metadata, &config(), "suite"), expected);
    }

    #[test]
    fn unprivileged_requirement() {
        let metadata = TestMetadata::builder()
            .set_required_user(RequiredUser::Unprivileged)
            .build();
        if unsafe { libc::geteuid() } == 0 {
            // As root the unprivileged user must be configured.
            assert_eq!(
                check_requirements(&metadata, &config(), "suite"),
                Some(
                    "Requires an unprivileged user but the unprivileged-user configuration \
                     variable is not defined"
                        .to_owned()
                )
            );
            let mut config = config();
            config.set_unprivileged_user("nobody");
            assert_eq!(check_requirements(&metadata, &config, "suite"), None);
        } else {
            assert_eq!(check_requirements(&metadata, &config(), "suite"), None);
        }
    }

    #[test]
    fn required_file_missing() {
        let metadata = TestMetadata::builder()
            .add_required_file("/nonexistent/fixture.bin")
            .build();
        assert_eq!(
            check_requirements(&metadata, &config(), "suite"),
            Some("Required file '/nonexistent/fixture.bin' not found".to_owned())
        );
    }

    #[test]
    fn required_file_present() {
        let dir = camino_tempfile::tempdir().unwrap();
        let file = dir.path().join("fixture.bin");
        std::fs::write(&file, b"data").unwrap();
        let metadata = TestMetadata::builder().add_required_file(file).build();
        assert_eq!(check_requirements(&metadata, &config(), "suite"), None);
    }

    #[test]
    fn required_program_absolute() {
        let metadata = TestMetadata::builder().add_required_program("/bin/sh").build();
        assert_eq!(check_requirements(&metadata, &config(), "suite"), None);

        let metadata = TestMetadata::builder()
            .add_required_program("/nonexistent/bin/frobnicate")
            .build();
        assert_eq!(
            check_requirements(&metadata, &config(), "suite"),
            Some("Required program '/nonexistent/bin/frobnicate' not found".to_owned())
        );
    }

    #[test]
    fn required_program_in_path() {
        let metadata = TestMetadata::builder().add_required_program("sh").build();
        assert_eq!(check_requirements(&metadata, &config(), "suite"), None);

        let metadata = TestMetadata::builder()
            .add_required_program("petrel-no-such-tool")
            .build();
        assert_eq!(
            check_requirements(&metadata, &config(), "suite"),
            Some("Required program 'petrel-no-such-tool' not found in PATH".to_owned())
        );
    }

    #[test]
    fn reasonable_memory_requirement_passes() {
        let metadata = TestMetadata::builder().set_required_memory(1024).build();
        assert_eq!(check_requirements(&metadata, &config(), "suite"), None);
    }

    #[test]
    fn absurd_memory_requirement_skips() {
        if physical_memory() == 0 {
            // Unsupported query: the check is a no-op here.
            return;
        }
        let metadata = TestMetadata::builder()
            .set_required_memory(u64::MAX)
            .build();
        let reason = check_requirements(&metadata, &config(), "suite").unwrap();
        assert!(
            reason.starts_with(&format!(
                "Requires {} bytes of physical memory but only ",
                u64::MAX
            )),
            "unexpected reason: {reason}"
        );
    }

    #[test]
    fn checks_run_in_order() {
        // Config requirements are evaluated before architecture ones.
        let metadata = TestMetadata::builder()
            .add_required_config("magic_var")
            .add_allowed_architecture("nonexistent-arch")
            .build();
        assert_eq!(
            check_requirements(&metadata, &config(), "suite"),
            Some("Required configuration property 'magic_var' not defined".to_owned())
        );
    }
}
