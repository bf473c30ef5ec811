// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-invocation log tree.
//!
//! Each invocation gets `<log_location>/<lab>/<timestamp>/` containing
//! `full_logs.txt`, plus one sub-directory per executed test case with
//! its own `log.txt`.  Loggers duplicate to the terminal and to the
//! file, with independently configured levels.

use camino::{Utf8Path, Utf8PathBuf};
use slog::{o, Drain, Logger};
use stratus_config::{LogLevel, LoggerConfig};
use thiserror::Error;

pub const FULL_LOG_FILE: &str = "full_logs.txt";
pub const TEST_LOG_FILE: &str = "log.txt";

#[derive(Debug, Error)]
pub enum LogSetupError {
    #[error("creating log directory \"{path}\": {err}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("opening log file \"{path}\": {err}")]
    OpenFile {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// The log tree for one scanner or runner invocation.
pub struct SessionLogs {
    pub logger: Logger,
    pub session_dir: Utf8PathBuf,
    console_level: slog::Level,
    file_level: slog::Level,
}

/// Logs for one executed test case.
pub struct TestCaseLogs {
    pub logger: Logger,
    pub dir: Utf8PathBuf,
    pub log_file: Utf8PathBuf,
}

impl SessionLogs {
    /// Create the session directory and its root logger.
    pub fn create(
        config: &LoggerConfig,
        lab_name: &str,
    ) -> Result<SessionLogs, LogSetupError> {
        let session_dir = if config.append_lab_and_timestamp {
            let timestamp =
                chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
            config.log_location.join(lab_name).join(timestamp)
        } else {
            config.log_location.clone()
        };
        std::fs::create_dir_all(&session_dir).map_err(|err| {
            LogSetupError::CreateDir { path: session_dir.clone(), err }
        })?;

        let console_level = slog_level(config.console_log_level);
        let file_level = slog_level(config.file_log_level);
        let logger = file_and_term_logger(
            &session_dir.join(FULL_LOG_FILE),
            console_level,
            file_level,
            o!("lab" => lab_name.to_string()),
        )?;

        Ok(SessionLogs { logger, session_dir, console_level, file_level })
    }

    /// Create the sub-directory and logger for one test case.
    pub fn test_case_logs(
        &self,
        test_name: &str,
    ) -> Result<TestCaseLogs, LogSetupError> {
        let dir = self.session_dir.join(sanitize(test_name));
        std::fs::create_dir_all(&dir).map_err(|err| {
            LogSetupError::CreateDir { path: dir.clone(), err }
        })?;
        let log_file = dir.join(TEST_LOG_FILE);
        let logger = file_and_term_logger(
            &log_file,
            self.console_level,
            self.file_level,
            o!("test" => test_name.to_string()),
        )?;
        Ok(TestCaseLogs { logger, dir, log_file })
    }
}

fn slog_level(level: LogLevel) -> slog::Level {
    match level {
        LogLevel::Debug => slog::Level::Debug,
        LogLevel::Info => slog::Level::Info,
        LogLevel::Warning => slog::Level::Warning,
        LogLevel::Error => slog::Level::Error,
    }
}

fn file_and_term_logger<T>(
    file_path: &Utf8Path,
    console_level: slog::Level,
    file_level: slog::Level,
    values: slog::OwnedKV<T>,
) -> Result<Logger, LogSetupError>
where
    T: slog::SendSyncRefUnwindSafeKV + 'static,
{
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)
        .map_err(|err| LogSetupError::OpenFile {
            path: file_path.to_owned(),
            err,
        })?;

    let console_drain =
        slog_term::FullFormat::new(slog_term::TermDecorator::new().build())
            .build()
            .filter_level(console_level)
            .ignore_res();
    let file_drain =
        slog_term::FullFormat::new(slog_term::PlainDecorator::new(file))
            .build()
            .filter_level(file_level)
            .ignore_res();
    let drain = slog_async::Async::new(
        slog::Duplicate::new(console_drain, file_drain).ignore_res(),
    )
    .build()
    .ignore_res();
    Ok(Logger::root(drain, values))
}

// Test node ids contain `::` and path separators; flatten them so each
// test maps to one directory component.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}
