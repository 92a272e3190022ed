// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test-case metadata and its builder.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, str::FromStr,
    time::Duration,
};

/// Deadline applied to each execution phase when the test does not declare
/// its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// The class of user a test case needs in order to run.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RequiredUser {
    /// No user requirement.
    #[default]
    Any,
    /// The test must run with root privileges.
    Root,
    /// The test must run as a non-root user.
    Unprivileged,
}

impl fmt::Display for RequiredUser {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RequiredUser::Any => "any",
            RequiredUser::Root => "root",
            RequiredUser::Unprivileged => "unprivileged",
        };
        f.write_str(s)
    }
}

impl FromStr for RequiredUser {
    type Err = InvalidRequiredUser;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root" => Ok(RequiredUser::Root),
            "unprivileged" => Ok(RequiredUser::Unprivileged),
            other => Err(InvalidRequiredUser(other.to_owned())),
        }
    }
}

/// Error parsing a [`RequiredUser`] from a string.
#[derive(Clone, Debug)]
pub struct InvalidRequiredUser(String);

impl fmt::Display for InvalidRequiredUser {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "invalid user requirement '{}' (expected 'root' or 'unprivileged')",
            self.0
        )
    }
}

impl std::error::Error for InvalidRequiredUser {}

/// The execution constraints and settings a test case declares.
///
/// All constraint fields are optional in the sense that their empty or zero
/// value means "unrestricted". The timeout always carries a concrete value:
/// [`MetadataBuilder::build`] injects [`DEFAULT_TIMEOUT`] when the test did
/// not declare one, so downstream consumers never have to special-case a
/// missing deadline.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct TestMetadata {
    allowed_architectures: BTreeSet<String>,
    allowed_platforms: BTreeSet<String>,
    required_configs: BTreeSet<String>,
    required_files: BTreeSet<Utf8PathBuf>,
    required_programs: BTreeSet<Utf8PathBuf>,
    required_memory: u64,
    required_user: RequiredUser,
    #[serde(with = "humantime_serde")]
    timeout: Duration,
    has_cleanup: bool,
    description: String,
    custom: BTreeMap<String, String>,
}

impl Default for TestMetadata {
    fn default() -> Self {
        MetadataBuilder::new().build()
    }
}

impl TestMetadata {
    /// Starts building a metadata record.
    pub fn builder() -> MetadataBuilder {
        MetadataBuilder::new()
    }

    /// Architectures the test may run on; empty means unrestricted.
    pub fn allowed_architectures(&self) -> &BTreeSet<String> {
        &self.allowed_architectures
    }

    /// Platforms the test may run on; empty means unrestricted.
    pub fn allowed_platforms(&self) -> &BTreeSet<String> {
        &self.allowed_platforms
    }

    /// Configuration properties that must be defined for the test to run.
    pub fn required_configs(&self) -> &BTreeSet<String> {
        &self.required_configs
    }

    /// Files that must exist for the test to run.
    pub fn required_files(&self) -> &BTreeSet<Utf8PathBuf> {
        &self.required_files
    }

    /// Programs that must be present (absolute or PATH-resolvable).
    pub fn required_programs(&self) -> &BTreeSet<Utf8PathBuf> {
        &self.required_programs
    }

    /// Minimum amount of physical memory in bytes; 0 means unrestricted.
    pub fn required_memory(&self) -> u64 {
        self.required_memory
    }

    /// The class of user the test needs.
    pub fn required_user(&self) -> RequiredUser {
        self.required_user
    }

    /// Wall-clock deadline for each execution phase.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the test declares a cleanup phase.
    pub fn has_cleanup(&self) -> bool {
        self.has_cleanup
    }

    /// Free-form description of the test case.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Custom `X-` properties declared by the test.
    pub fn custom(&self) -> &BTreeMap<String, String> {
        &self.custom
    }
}

/// Builder for [`TestMetadata`].
#[derive(Clone, Debug, Default)]
pub struct MetadataBuilder {
    allowed_architectures: BTreeSet<String>,
    allowed_platforms: BTreeSet<String>,
    required_configs: BTreeSet<String>,
    required_files: BTreeSet<Utf8PathBuf>,
    required_programs: BTreeSet<Utf8PathBuf>,
    required_memory: u64,
    required_user: RequiredUser,
    timeout: Option<Duration>,
    has_cleanup: bool,
    description: String,
    custom: BTreeMap<String, String>,
}

impl MetadataBuilder {
    /// Creates a builder with no constraints set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the test to the given architectures.
    pub fn add_allowed_architecture(&mut self, arch: impl Into<String>) -> &mut Self {
        self.allowed_architectures.insert(arch.into());
        self
    }

    /// Restricts the test to the given platforms.
    pub fn add_allowed_platform(&mut self, platform: impl Into<String>) -> &mut Self {
        self.allowed_platforms.insert(platform.into());
        self
    }

    /// Requires a configuration property to be defined.
    pub fn add_required_config(&mut self, name: impl Into<String>) -> &mut Self {
        self.required_configs.insert(name.into());
        self
    }

    /// Requires a file to exist.
    pub fn add_required_file(&mut self, path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.required_files.insert(path.into());
        self
    }

    /// Requires a program to be present.
    pub fn add_required_program(&mut self, path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.required_programs.insert(path.into());
        self
    }

    /// Requires at least the given amount of physical memory, in bytes.
    pub fn set_required_memory(&mut self, bytes: u64) -> &mut Self {
        self.required_memory = bytes;
        self
    }

    /// Sets the class of user the test needs.
    pub fn set_required_user(&mut self, user: RequiredUser) -> &mut Self {
        self.required_user = user;
        self
    }

    /// Sets the per-phase deadline.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declares that the test has a cleanup phase.
    pub fn set_has_cleanup(&mut self, has_cleanup: bool) -> &mut Self {
        self.has_cleanup = has_cleanup;
        self
    }

    /// Sets the description of the test case.
    pub fn set_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = description.into();
        self
    }

    /// Records a custom `X-` property.
    pub fn add_custom(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Finalizes the metadata, injecting the default timeout if the test
    /// did not declare one.
    pub fn build(&self) -> TestMetadata {
        TestMetadata {
            allowed_architectures: self.allowed_architectures.clone(),
            allowed_platforms: self.allowed_platforms.clone(),
            required_configs: self.required_configs.clone(),
            required_files: self.required_files.clone(),
            required_programs: self.required_programs.clone(),
            required_memory: self.required_memory,
            required_user: self.required_user,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            has_cleanup: self.has_cleanup,
            description: self.description.clone(),
            custom: self.custom.clone(),
        }
    }
}
