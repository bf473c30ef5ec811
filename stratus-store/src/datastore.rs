// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Primary interface for result-store reads and writes.
//!
//! Every call acquires its own connection and autocommits, except the
//! capability replacement, which runs in one transaction so a scan
//! never leaves a lab half-tagged.

use crate::error::StoreError;
use crate::operations::{
    sql_execute, sql_query, sql_query_one, sql_row_value,
};
use crate::pool::Pool;
use slog::{error, warn, Logger};
use slog_error_chain::InlineErrorChain;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use stratus_config::DatabaseConfig;
use stratus_types::{
    CapabilityTag, ExecutionStatus, TestCase, TestCaseResult, UpgradeEvent,
};

/// How long to wait between attempts while the database cannot be
/// resolved.  Deliberately unbounded: the run blocks until the store
/// returns rather than dropping results (see `write_with_retry`).
pub const DNS_RETRY_INTERVAL: Duration = Duration::from_secs(60);

pub struct DataStore {
    pool: Pool,
    log: Logger,
}

impl DataStore {
    pub fn new(log: &Logger, db_config: &DatabaseConfig) -> DataStore {
        DataStore {
            pool: Pool::new(db_config),
            log: log.new(slog::o!("component" => "datastore")),
        }
    }

    /// Run a write operation under the store's availability policy:
    /// DNS-shaped outages are waited out forever at
    /// [`DNS_RETRY_INTERVAL`]; any other failure is logged and swallowed
    /// so the test run continues.  Returns `None` when the write was
    /// given up on.
    pub async fn write_with_retry<T, F, Fut>(
        &self,
        what: &str,
        mut op: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        loop {
            match op().await {
                Ok(value) => return Some(value),
                Err(err) if err.is_transient() => {
                    warn!(
                        self.log,
                        "database unreachable; retrying";
                        "operation" => what,
                        "retry_after" => ?DNS_RETRY_INTERVAL,
                        "error" => %InlineErrorChain::new(&err),
                    );
                    tokio::time::sleep(DNS_RETRY_INTERVAL).await;
                }
                Err(err) => {
                    error!(
                        self.log,
                        "database write failed; continuing without it";
                        "operation" => what,
                        "error" => %InlineErrorChain::new(&err),
                    );
                    return None;
                }
            }
        }
    }

    /// Look up the lab's id, inserting it on first sight.
    pub async fn ensure_lab(&self, lab_name: &str) -> Result<i32, StoreError> {
        let client = self.pool.acquire().await?;
        let rows = sql_query(
            &client,
            "SELECT lab_info_id FROM lab_info WHERE lab_name = $1",
            &[&lab_name],
        )
        .await?;
        if let Some(row) = rows.first() {
            return sql_row_value(row, "lab_info_id");
        }
        let row = sql_query_one(
            &client,
            "INSERT INTO lab_info (lab_name) VALUES ($1) \
             RETURNING lab_info_id",
            &[&lab_name],
        )
        .await?;
        sql_row_value(&row, "lab_info_id")
    }

    /// Replace the lab's capability rows with `tags`, in one
    /// transaction.  Tags missing from the `capability` registry table
    /// are logged and skipped, as the original scanner did.
    pub async fn replace_lab_capabilities(
        &self,
        lab_info_id: i32,
        tags: &BTreeSet<CapabilityTag>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        let tx = conn.transaction().await.map_err(|source| {
            StoreError::Sql { sql: "BEGIN".to_string(), source }
        })?;

        let delete_sql = "DELETE FROM capability_lab WHERE lab_info_id = $1";
        tx.execute(delete_sql, &[&lab_info_id]).await.map_err(|source| {
            StoreError::Sql { sql: delete_sql.to_string(), source }
        })?;

        for tag in tags {
            let marker = tag.to_string();
            let select_sql = "SELECT capability_id FROM capability \
                              WHERE capability_marker = $1";
            let rows =
                tx.query(select_sql, &[&marker]).await.map_err(|source| {
                    StoreError::Sql { sql: select_sql.to_string(), source }
                })?;
            match rows.first() {
                Some(row) => {
                    let capability_id: i32 =
                        sql_row_value(row, "capability_id")?;
                    let insert_sql =
                        "INSERT INTO capability_lab \
                         (lab_info_id, capability_id) VALUES ($1, $2)";
                    tx.execute(insert_sql, &[&lab_info_id, &capability_id])
                        .await
                        .map_err(|source| StoreError::Sql {
                            sql: insert_sql.to_string(),
                            source,
                        })?;
                }
                None => {
                    error!(
                        self.log,
                        "no capability with this marker in the database";
                        "marker" => &marker,
                    );
                }
            }
        }

        tx.commit().await.map_err(|source| StoreError::Sql {
            sql: "COMMIT".to_string(),
            source,
        })
    }

    pub async fn get_test_plan(
        &self,
        test_plan_id: i32,
    ) -> Result<(String, i32), StoreError> {
        let client = self.pool.acquire().await?;
        let row = sql_query_one(
            &client,
            "SELECT test_plan_name, run_type_id FROM test_plan \
             WHERE test_plan_id = $1",
            &[&test_plan_id],
        )
        .await?;
        Ok((
            sql_row_value(&row, "test_plan_name")?,
            sql_row_value(&row, "run_type_id")?,
        ))
    }

    pub async fn create_run(
        &self,
        run_name: &str,
        run_type_id: i32,
        release: &str,
    ) -> Result<i32, StoreError> {
        let client = self.pool.acquire().await?;
        let row = sql_query_one(
            &client,
            "INSERT INTO run (run_name, run_type_id, release) \
             VALUES ($1, $2, $3) RETURNING run_id",
            &[&run_name, &run_type_id, &release],
        )
        .await?;
        sql_row_value(&row, "run_id")
    }

    /// Materialise the plan's enabled (session, test) pairs into
    /// run_content rows with status NOT_RUN.  Returns the row count.
    pub async fn create_run_content(
        &self,
        test_plan_id: i32,
        run_id: i32,
    ) -> Result<u64, StoreError> {
        let client = self.pool.acquire().await?;
        sql_execute(
            &client,
            "INSERT INTO run_content \
             (run_id, session_info_id, test_info_id, status, fail_count) \
             SELECT $1, session_info.session_info_id, \
                    session_info_content.test_info_id, 'NOT_RUN', 0 \
             FROM session_info \
             JOIN session_info_content USING (session_info_id) \
             WHERE session_info.test_plan_id = $2 \
               AND session_info.enabled \
               AND session_info_content.enabled",
            &[&run_id, &test_plan_id],
        )
        .await
    }

    /// The run's tests with their capability markers, in run-content
    /// order.
    pub async fn get_tests_for_run(
        &self,
        run_id: i32,
    ) -> Result<Vec<TestCase>, StoreError> {
        let client = self.pool.acquire().await?;
        let rows = sql_query(
            &client,
            "SELECT run_content.run_content_id, test_info.test_info_id, \
                    test_info.test_name, test_info.test_suite, \
                    test_info.priority, test_info.pytest_node_id, \
                    capability.capability_marker \
             FROM run_content \
             JOIN test_info USING (test_info_id) \
             LEFT JOIN capability_test USING (test_info_id) \
             LEFT JOIN capability USING (capability_id) \
             WHERE run_content.run_id = $1 \
             ORDER BY run_content.run_content_id",
            &[&run_id],
        )
        .await?;

        let mut parts = Vec::with_capacity(rows.len());
        for row in &rows {
            parts.push(TestRowParts {
                run_content_id: sql_row_value(row, "run_content_id")?,
                test_info_id: sql_row_value(row, "test_info_id")?,
                test_name: sql_row_value(row, "test_name")?,
                test_suite: sql_row_value(row, "test_suite")?,
                priority: sql_row_value(row, "priority")?,
                pytest_node_id: sql_row_value(row, "pytest_node_id")?,
                marker: sql_row_value(row, "capability_marker")?,
            });
        }
        Ok(fold_test_rows(parts))
    }

    /// Look up the test's id by node id, inserting it on first sight.
    pub async fn ensure_test_info(
        &self,
        test: &TestCase,
    ) -> Result<i32, StoreError> {
        let client = self.pool.acquire().await?;
        let rows = sql_query(
            &client,
            "SELECT test_info_id FROM test_info WHERE pytest_node_id = $1",
            &[&test.node_id],
        )
        .await?;
        if let Some(row) = rows.first() {
            return sql_row_value(row, "test_info_id");
        }
        let priority = test.priority.map(|p| p.to_string());
        let row = sql_query_one(
            &client,
            "INSERT INTO test_info \
             (test_name, test_suite, priority, pytest_node_id) \
             VALUES ($1, $2, $3, $4) RETURNING test_info_id",
            &[&test.name, &test.suite, &priority, &test.node_id],
        )
        .await?;
        sql_row_value(&row, "test_info_id")
    }

    /// Insert a new result row, or update the one named by
    /// `test_case_result_id` when a rerun is refreshing it.  Returns the
    /// row id.
    pub async fn upsert_result(
        &self,
        result: &TestCaseResult,
    ) -> Result<i32, StoreError> {
        let client = self.pool.acquire().await?;
        let outcome = result.outcome.as_str();
        let duration = result.duration_secs();
        let log_dir = result.log_dir.as_ref().map(|p| p.to_string());
        match result.test_case_result_id {
            Some(id) => {
                sql_execute(
                    &client,
                    "UPDATE test_case_result \
                     SET outcome = $1, start_time = $2, end_time = $3, \
                         duration = $4, runner_host = $5, log_dir = $6 \
                     WHERE test_case_result_id = $7",
                    &[
                        &outcome,
                        &result.start_time,
                        &result.end_time,
                        &duration,
                        &result.runner_host,
                        &log_dir,
                        &id,
                    ],
                )
                .await?;
                Ok(id)
            }
            None => {
                let row = sql_query_one(
                    &client,
                    "INSERT INTO test_case_result \
                     (test_info_id, outcome, start_time, end_time, \
                      duration, runner_host, log_dir) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7) \
                     RETURNING test_case_result_id",
                    &[
                        &result.test_info_id,
                        &outcome,
                        &result.start_time,
                        &result.end_time,
                        &duration,
                        &result.runner_host,
                        &log_dir,
                    ],
                )
                .await?;
                sql_row_value(&row, "test_case_result_id")
            }
        }
    }

    /// Move a run-content row to `status`, enforcing monotonicity; a
    /// FAIL also bumps the row's fail counter.
    pub async fn update_run_content_status(
        &self,
        run_content_id: i32,
        status: ExecutionStatus,
    ) -> Result<(), StoreError> {
        let client = self.pool.acquire().await?;
        let row = sql_query_one(
            &client,
            "SELECT status FROM run_content WHERE run_content_id = $1",
            &[&run_content_id],
        )
        .await?;
        let current: String = sql_row_value(&row, "status")?;
        if let Ok(from) = current.parse::<ExecutionStatus>() {
            if !from.may_transition_to(status) {
                return Err(StoreError::Monotonicity {
                    run_content_id,
                    from: current,
                    to: status.to_string(),
                });
            }
        }

        let new_status = status.as_str();
        if status == ExecutionStatus::Fail {
            sql_execute(
                &client,
                "UPDATE run_content \
                 SET status = $1, fail_count = fail_count + 1 \
                 WHERE run_content_id = $2",
                &[&new_status, &run_content_id],
            )
            .await?;
        } else {
            sql_execute(
                &client,
                "UPDATE run_content SET status = $1 \
                 WHERE run_content_id = $2",
                &[&new_status, &run_content_id],
            )
            .await?;
        }
        Ok(())
    }

    pub async fn record_upgrade_event(
        &self,
        test_case_result_id: i32,
        event: &UpgradeEvent,
    ) -> Result<i32, StoreError> {
        let client = self.pool.acquire().await?;
        let row = sql_query_one(
            &client,
            "INSERT INTO upgrade_event \
             (test_case_result_id, event_name, from_version, to_version, \
              duration, is_rollback) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING upgrade_event_id",
            &[
                &test_case_result_id,
                &event.event_name,
                &event.from_version,
                &event.to_version,
                &event.duration_secs,
                &event.is_rollback,
            ],
        )
        .await?;
        sql_row_value(&row, "upgrade_event_id")
    }
}

struct TestRowParts {
    run_content_id: i32,
    test_info_id: i32,
    test_name: String,
    test_suite: String,
    priority: Option<String>,
    pytest_node_id: String,
    marker: Option<String>,
}

// The query yields one row per (test, marker); fold them back into one
// TestCase per run-content row, markers in query order.
fn fold_test_rows(parts: Vec<TestRowParts>) -> Vec<TestCase> {
    let mut tests: Vec<TestCase> = Vec::new();
    for part in parts {
        let existing = tests
            .iter()
            .position(|t| t.run_content_id == Some(part.run_content_id));
        let test = match existing {
            Some(index) => &mut tests[index],
            None => {
                let mut test = TestCase::new(
                    &part.test_suite,
                    &part.test_name,
                    &part.pytest_node_id,
                );
                test.priority =
                    part.priority.as_deref().and_then(|p| p.parse().ok());
                test.test_info_id = Some(part.test_info_id);
                test.run_content_id = Some(part.run_content_id);
                tests.push(test);
                tests.last_mut().unwrap()
            }
        };
        if let Some(marker) = part.marker {
            if !test.markers.contains(&marker) {
                test.markers.push(marker);
            }
        }
    }
    tests
}
