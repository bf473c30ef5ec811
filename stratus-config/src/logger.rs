// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logger configuration: where the log tree lives and how chatty the
//! console and file sinks are.

use crate::error::LoadError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::str::FromStr;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::EnumString,
)]
pub enum LogLevel {
    #[strum(serialize = "DEBUG")]
    Debug,
    #[strum(serialize = "INFO")]
    Info,
    #[strum(serialize = "WARNING")]
    Warning,
    #[strum(serialize = "ERROR")]
    Error,
}

#[derive(Debug, Deserialize)]
struct RawLoggerConfig {
    log_location: String,
    console_log_level: String,
    file_log_level: String,
    append_lab_and_timestamp: Option<bool>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggerConfig {
    /// root of the log tree
    pub log_location: Utf8PathBuf,
    pub console_log_level: LogLevel,
    pub file_log_level: LogLevel,
    /// create a `<lab>/<timestamp>/` subtree per invocation
    pub append_lab_and_timestamp: bool,
}

impl LoggerConfig {
    pub fn from_file(path: &Utf8Path) -> Result<LoggerConfig, LoadError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.to_owned(), err })?;
        let raw: RawLoggerConfig = json5::from_str(&contents)
            .map_err(|err| LoadError::Parse { path: path.to_owned(), err })?;

        Ok(LoggerConfig {
            log_location: resolve_location(&raw.log_location)?,
            console_log_level: parse_level(path, &raw.console_log_level)?,
            file_log_level: parse_level(path, &raw.file_log_level)?,
            append_lab_and_timestamp: raw
                .append_lab_and_timestamp
                .unwrap_or(true),
        })
    }

    /// The configuration used when no logger config file is supplied:
    /// `~/AUTOMATION_LOGS`, INFO console, DEBUG file.
    pub fn built_in_default() -> Result<LoggerConfig, LoadError> {
        Ok(LoggerConfig {
            log_location: resolve_location("DEFAULT")?,
            console_log_level: LogLevel::Info,
            file_log_level: LogLevel::Debug,
            append_lab_and_timestamp: true,
        })
    }
}

// "DEFAULT" means "~/AUTOMATION_LOGS".
fn resolve_location(raw: &str) -> Result<Utf8PathBuf, LoadError> {
    if raw == "DEFAULT" {
        let home = std::env::var("HOME").map_err(|_| LoadError::MissingHome)?;
        Ok(Utf8PathBuf::from(home).join("AUTOMATION_LOGS"))
    } else {
        Ok(Utf8PathBuf::from(raw))
    }
}

fn parse_level(path: &Utf8Path, raw: &str) -> Result<LogLevel, LoadError> {
    LogLevel::from_str(raw).map_err(|_| LoadError::BadValue {
        path: path.to_owned(),
        err: format!(
            "invalid log level {:?} (expected DEBUG, INFO, WARNING or ERROR)",
            raw
        ),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn test_load_logger_config() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("logger.json5");
        std::fs::write(
            &path,
            r#"{
                log_location: "/var/log/stratus",
                console_log_level: "INFO",
                file_log_level: "DEBUG",
            }"#,
        )
        .unwrap();
        let config = LoggerConfig::from_file(&path).unwrap();
        assert_eq!(config.log_location, Utf8PathBuf::from("/var/log/stratus"));
        assert_eq!(config.console_log_level, LogLevel::Info);
        assert_eq!(config.file_log_level, LogLevel::Debug);
        assert!(config.append_lab_and_timestamp);
    }

    #[test]
    fn test_bad_level_is_fatal() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("logger.json5");
        std::fs::write(
            &path,
            r#"{
                log_location: "/tmp",
                console_log_level: "LOUD",
                file_log_level: "DEBUG",
            }"#,
        )
        .unwrap();
        assert_matches!(
            LoggerConfig::from_file(&path),
            Err(LoadError::BadValue { .. })
        );
    }
}
