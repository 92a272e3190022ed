// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The runner configuration tree.
//!
//! The engine only consumes a small slice of configuration: the current
//! architecture and platform, the optional unprivileged user, and free-form
//! per-suite variables that get forwarded to test programs. Front-ends may
//! load this from a TOML file with [`RunnerConfig::from_file`] or build it
//! in memory.

use crate::errors::ConfigLoadError;
use camino::Utf8Path;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Keys under which tests may request the unprivileged user; both spellings
/// resolve to the top-level `unprivileged_user` setting.
const UNPRIVILEGED_USER_ALIASES: [&str; 2] = ["unprivileged-user", "unprivileged_user"];

/// Configuration consumed by the engine.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RunnerConfig {
    architecture: String,
    platform: String,
    unprivileged_user: Option<String>,
    test_suites: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            architecture: std::env::consts::ARCH.to_owned(),
            platform: std::env::consts::OS.to_owned(),
            unprivileged_user: None,
            test_suites: BTreeMap::new(),
        }
    }
}

impl RunnerConfig {
    /// Loads the configuration from a TOML file.
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigLoadError> {
        config::Config::builder()
            .add_source(config::File::new(
                path.as_str(),
                config::FileFormat::Toml,
            ))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|err| ConfigLoadError::new(path, err))
    }

    /// The architecture tests are gated against.
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// Overrides the architecture (defaults to the host's).
    pub fn set_architecture(&mut self, architecture: impl Into<String>) {
        self.architecture = architecture.into();
    }

    /// The platform tests are gated against.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Overrides the platform (defaults to the host's).
    pub fn set_platform(&mut self, platform: impl Into<String>) {
        self.platform = platform.into();
    }

    /// The user to drop privileges to, if configured.
    pub fn unprivileged_user(&self) -> Option<&str> {
        self.unprivileged_user.as_deref()
    }

    /// Sets the unprivileged user.
    pub fn set_unprivileged_user(&mut self, user: impl Into<String>) {
        self.unprivileged_user = Some(user.into());
    }

    /// Sets a per-suite configuration variable.
    pub fn set_suite_var(
        &mut self,
        test_suite: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.test_suites
            .entry(test_suite.into())
            .or_default()
            .insert(name.into(), value.into());
    }

    /// Looks up a per-suite configuration variable.
    pub fn suite_var(&self, test_suite: &str, name: &str) -> Option<&str> {
        self.test_suites
            .get(test_suite)
            .and_then(|vars| vars.get(name))
            .map(String::as_str)
    }

    /// Whether a property a test may require is defined.
    ///
    /// The `unprivileged-user`/`unprivileged_user` names are aliases for the
    /// top-level setting; everything else resolves within the suite's
    /// variables.
    pub fn is_property_defined(&self, test_suite: &str, name: &str) -> bool {
        if UNPRIVILEGED_USER_ALIASES.contains(&name) {
            self.unprivileged_user.is_some()
        } else {
            self.suite_var(test_suite, name).is_some()
        }
    }

    /// The variables to forward to a test program, as `(name, value)`
    /// pairs: the suite's variables plus `unprivileged-user` when one is
    /// configured.
    pub fn suite_vars(&self, test_suite: &str) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if let Some(user) = &self.unprivileged_user {
            vars.push(("unprivileged-user".to_owned(), user.clone()));
        }
        if let Some(suite) = self.test_suites.get(test_suite) {
            vars.extend(suite.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        vars
    }
}
