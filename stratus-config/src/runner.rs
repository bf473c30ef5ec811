// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runner configuration: how the host test framework is invoked and how
//! long one test may run.

use crate::error::LoadError;
use camino::Utf8Path;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RunnerConfig {
    #[serde(default = "default_framework_command")]
    pub framework_command: String,
    #[serde(default)]
    pub pytest_args: Vec<String>,
    /// outer wall-clock cap for a single test, seconds
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,
    #[serde(default = "default_release")]
    pub release: String,
}

fn default_framework_command() -> String {
    "pytest".to_string()
}

fn default_test_timeout_secs() -> u64 {
    3600
}

fn default_release() -> String {
    "24.09".to_string()
}

impl RunnerConfig {
    pub fn from_file(path: &Utf8Path) -> Result<RunnerConfig, LoadError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.to_owned(), err })?;
        json5::from_str(&contents)
            .map_err(|err| LoadError::Parse { path: path.to_owned(), err })
    }
}

impl Default for RunnerConfig {
    fn default() -> RunnerConfig {
        RunnerConfig {
            framework_command: default_framework_command(),
            pytest_args: Vec::new(),
            test_timeout_secs: default_test_timeout_secs(),
            release: default_release(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.framework_command, "pytest");
        assert_eq!(config.test_timeout_secs, 3600);
    }

    #[test]
    fn test_load_runner_config() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("runner.json5");
        std::fs::write(
            &path,
            r#"{
                pytest_args: ["-x", "--no-header"],
                test_timeout_secs: 120,
            }"#,
        )
        .unwrap();
        let config = RunnerConfig::from_file(&path).unwrap();
        assert_eq!(config.framework_command, "pytest");
        assert_eq!(config.pytest_args, vec!["-x", "--no-header"]);
        assert_eq!(config.test_timeout_secs, 120);
    }
}
