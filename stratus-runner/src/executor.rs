// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test execution: one test at a time, each in its own child process of
//! the host test framework, under an outer wall-clock cap.
//!
//! One test's failure never aborts the run; every outcome lands in the
//! summary, and in the store when one is configured.

use crate::summary::ExecutorSummary;
use chrono::Utc;
use slog::{error, info, warn, Logger};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use stratus_config::RunnerConfig;
use stratus_log::SessionLogs;
use stratus_store::DataStore;
use stratus_types::{ExecutionStatus, TestCase, TestCaseResult};

pub struct TestExecutor<'a> {
    log: Logger,
    session: &'a SessionLogs,
    config: RunnerConfig,
    repo_root: camino::Utf8PathBuf,
    store: Option<Arc<DataStore>>,
    runner_host: String,
}

impl<'a> TestExecutor<'a> {
    pub fn new(
        session: &'a SessionLogs,
        config: RunnerConfig,
        repo_root: &camino::Utf8Path,
        store: Option<Arc<DataStore>>,
        runner_host: String,
    ) -> TestExecutor<'a> {
        TestExecutor {
            log: session.logger.new(slog::o!("component" => "executor")),
            session,
            config,
            repo_root: repo_root.to_owned(),
            store,
            runner_host,
        }
    }

    /// Run every selected test serially.  `test_case_result_id`, when
    /// given, refreshes that existing result row instead of creating
    /// new ones.
    pub async fn execute_all(
        &self,
        tests: &[TestCase],
        test_case_result_id: Option<i32>,
    ) -> ExecutorSummary {
        let mut summary = ExecutorSummary::new();
        for test in tests {
            let outcome =
                self.execute_one(test, test_case_result_id).await;
            summary.record(&test.node_id, outcome);
        }
        summary.log(&self.log);
        summary
    }

    async fn execute_one(
        &self,
        test: &TestCase,
        test_case_result_id: Option<i32>,
    ) -> ExecutionStatus {
        info!(self.log, "running test"; "test" => &test.node_id);
        let start_time = Utc::now();

        let test_logs = match self.session.test_case_logs(&test.node_id) {
            Ok(logs) => Some(logs),
            Err(err) => {
                warn!(
                    self.log,
                    "could not create the test log directory";
                    "test" => &test.node_id,
                    "error" => %err,
                );
                None
            }
        };

        let outcome = self
            .run_framework(test, test_case_result_id, test_logs.as_ref())
            .await;
        let end_time = Utc::now();
        info!(
            self.log,
            "test finished";
            "test" => &test.node_id,
            "outcome" => %outcome,
        );

        self.record_outcome(
            test,
            test_case_result_id,
            outcome,
            start_time,
            end_time,
            test_logs.as_ref().map(|logs| logs.dir.clone()),
        )
        .await;
        outcome
    }

    // Spawn the framework on this single test's node id and watch the
    // wall clock.  On timeout the worker is killed and the test fails;
    // the run moves on either way.
    async fn run_framework(
        &self,
        test: &TestCase,
        test_case_result_id: Option<i32>,
        test_logs: Option<&stratus_log::TestCaseLogs>,
    ) -> ExecutionStatus {
        let timeout = Duration::from_secs(self.config.test_timeout_secs);

        let mut command =
            tokio::process::Command::new(&self.config.framework_command);
        command
            .args(&self.config.pytest_args)
            .arg(&test.node_id)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        // The framework's own result plugin refreshes this row too when
        // the run is updating an existing result.
        if let Some(id) = test_case_result_id {
            command.arg(format!("--test-case-result-id={}", id));
        }

        // The framework's output streams straight into the per-test
        // log.txt; stdout and stderr share the file.
        if let Some(logs) = test_logs {
            match open_log_sinks(&logs.log_file) {
                Ok((out, err)) => {
                    command.stdout(out).stderr(err);
                }
                Err(err) => {
                    warn!(
                        self.log,
                        "could not open test log file";
                        "test" => &test.node_id,
                        "error" => %err,
                    );
                }
            }
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(
                    self.log,
                    "failed to spawn the test framework";
                    "command" => &self.config.framework_command,
                    "error" => %err,
                );
                return ExecutionStatus::Fail;
            }
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Err(_) => {
                error!(
                    self.log,
                    "test exceeded its wall-clock cap; killing the worker";
                    "test" => &test.node_id,
                    "timeout_secs" => self.config.test_timeout_secs,
                );
                let _ = child.kill().await;
                ExecutionStatus::Fail
            }
            Ok(Err(err)) => {
                error!(
                    self.log,
                    "failed to wait on the test framework";
                    "error" => %err,
                );
                ExecutionStatus::Fail
            }
            Ok(Ok(status)) => {
                let tail = test_logs
                    .map(|logs| read_tail(&logs.log_file))
                    .unwrap_or_default();
                classify_outcome(status.success(), &tail)
            }
        }
    }

    async fn record_outcome(
        &self,
        test: &TestCase,
        test_case_result_id: Option<i32>,
        outcome: ExecutionStatus,
        start_time: chrono::DateTime<Utc>,
        end_time: chrono::DateTime<Utc>,
        log_dir: Option<camino::Utf8PathBuf>,
    ) {
        let Some(store) = self.store.as_deref() else {
            return;
        };

        let test_info_id = match test.test_info_id {
            Some(id) => Some(id),
            None => {
                store
                    .write_with_retry("ensure test info", move || {
                        store.ensure_test_info(test)
                    })
                    .await
            }
        };
        let Some(test_info_id) = test_info_id else {
            return;
        };

        let result = TestCaseResult {
            test_case_result_id,
            test_info_id,
            outcome,
            start_time,
            end_time,
            runner_host: self.runner_host.clone(),
            log_dir,
        };
        let result_ref = &result;
        store
            .write_with_retry("record test result", move || {
                store.upsert_result(result_ref)
            })
            .await;

        // A refresh of an existing result row leaves run content alone.
        if test_case_result_id.is_none() {
            if let Some(run_content_id) = test.run_content_id {
                store
                    .write_with_retry("update run content status", move || {
                        store.update_run_content_status(
                            run_content_id,
                            outcome,
                        )
                    })
                    .await;
            }
        }
    }
}

fn open_log_sinks(
    path: &camino::Utf8Path,
) -> std::io::Result<(std::fs::File, std::fs::File)> {
    let out = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let err = out.try_clone()?;
    Ok((out, err))
}

// The framework's summary line decides between PASS and SKIP; any
// non-zero exit is a FAIL.
fn classify_outcome(exit_ok: bool, output_tail: &str) -> ExecutionStatus {
    if !exit_ok {
        return ExecutionStatus::Fail;
    }
    if output_tail.contains(" skipped") && !output_tail.contains(" passed") {
        ExecutionStatus::Skip
    } else {
        ExecutionStatus::Pass
    }
}

fn read_tail(path: &camino::Utf8Path) -> String {
    const TAIL_BYTES: usize = 4096;
    match std::fs::read(path) {
        Ok(bytes) => {
            let start = bytes.len().saturating_sub(TAIL_BYTES);
            String::from_utf8_lossy(&bytes[start..]).into_owned()
        }
        Err(_) => String::new(),
    }
}

/// The local address the runner uses to reach the lab, recorded with
/// every result.  Falls back to loopback when nothing is routable.
pub fn runner_host_address(lab_floating_ip: &str) -> String {
    use std::net::UdpSocket;

    let (bind, target) = if lab_floating_ip.contains(':') {
        ("[::]:0", format!("[{}]:22", lab_floating_ip))
    } else {
        ("0.0.0.0:0", format!("{}:22", lab_floating_ip))
    };
    // Connecting a UDP socket picks a local address without sending
    // anything.
    UdpSocket::bind(bind)
        .and_then(|socket| {
            socket.connect(target)?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_classify_outcome() {
        assert_eq!(
            classify_outcome(true, "=== 1 passed in 0.21s ==="),
            ExecutionStatus::Pass
        );
        assert_eq!(
            classify_outcome(true, "=== 1 skipped in 0.01s ==="),
            ExecutionStatus::Skip
        );
        // Mixed runs count as a pass; the framework exit code already
        // said nothing failed.
        assert_eq!(
            classify_outcome(true, "=== 1 passed, 1 skipped in 0.2s ==="),
            ExecutionStatus::Pass
        );
        assert_eq!(
            classify_outcome(false, "=== 1 failed in 0.33s ==="),
            ExecutionStatus::Fail
        );
        assert_eq!(classify_outcome(true, ""), ExecutionStatus::Pass);
    }

    #[test]
    fn test_runner_host_address_never_fails() {
        let addr = runner_host_address("10.255.255.1");
        assert!(!addr.is_empty());
        let addr6 = runner_host_address("fdff::1");
        assert!(!addr6.is_empty());
    }

    #[tokio::test]
    async fn test_executor_runs_a_real_command() {
        use camino_tempfile::Utf8TempDir;
        use stratus_config::{LogLevel, LoggerConfig};

        let dir = Utf8TempDir::new().unwrap();
        let logger_config = LoggerConfig {
            log_location: dir.path().to_owned(),
            console_log_level: LogLevel::Error,
            file_log_level: LogLevel::Debug,
            append_lab_and_timestamp: false,
        };
        let session =
            SessionLogs::create(&logger_config, "test-lab").unwrap();

        // `true` exits 0 regardless of arguments: a PASS.
        let config = RunnerConfig {
            framework_command: "true".to_string(),
            pytest_args: Vec::new(),
            test_timeout_secs: 30,
            release: "24.09".to_string(),
        };
        let executor = TestExecutor::new(
            &session,
            config,
            dir.path(),
            None,
            "127.0.0.1".to_string(),
        );
        let test = TestCase::new("suite", "test_ok", "a.py::test_ok");
        let summary = executor.execute_all(&[test], None).await;
        assert_eq!(summary.counts(), (1, 0, 0));

        // `false` exits 1: a FAIL, and the run keeps going.
        let config = RunnerConfig {
            framework_command: "false".to_string(),
            pytest_args: Vec::new(),
            test_timeout_secs: 30,
            release: "24.09".to_string(),
        };
        let executor = TestExecutor::new(
            &session,
            config,
            dir.path(),
            None,
            "127.0.0.1".to_string(),
        );
        let tests = [
            TestCase::new("suite", "test_a", "a.py::test_a"),
            TestCase::new("suite", "test_b", "a.py::test_b"),
        ];
        let summary = executor.execute_all(&tests, None).await;
        assert_eq!(summary.counts(), (0, 2, 0));
    }
}
