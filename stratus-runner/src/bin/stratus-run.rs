// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Run every test the lab is capable of, from a test folder or from a
//! persisted test plan.
//!
//! Individual test failures are recorded, never propagated: the process
//! exits 0 unless the dispatcher itself failed to start.

use anyhow::{bail, Context};
use camino::Utf8PathBuf;
use clap::Parser;
use slog::info;
use std::collections::BTreeSet;
use std::sync::Arc;
use stratus_config::{
    DatabaseConfig, LabConfig, LoggerConfig, RunnerConfig,
};
use stratus_log::SessionLogs;
use stratus_runner::{
    collect_tests, runner_host_address, select_tests, TestExecutor,
};
use stratus_store::DataStore;

/// Capability-filtered test executor
#[derive(Debug, Parser)]
struct StratusRun {
    /// folder of tests to collect and run
    #[arg(long = "tests_location", conflicts_with = "test_plan_id")]
    tests_location: Option<Utf8PathBuf>,

    /// run the tests of this persisted test plan instead of a folder
    #[arg(long = "test_plan_id")]
    test_plan_id: Option<i32>,

    /// refresh this existing result row instead of creating new ones
    #[arg(long = "test_case_result_id")]
    test_case_result_id: Option<i32>,

    /// the lab to run against
    #[arg(long = "lab_config_file")]
    lab_config_file: Utf8PathBuf,

    /// root of the test repository (node ids are relative to it)
    #[arg(long = "repo_root", default_value = ".")]
    repo_root: Utf8PathBuf,

    #[arg(long = "logger_config_file")]
    logger_config_file: Option<Utf8PathBuf>,

    #[arg(long = "database_config_file")]
    database_config_file: Option<Utf8PathBuf>,

    #[arg(long = "runner_config_file")]
    runner_config_file: Option<Utf8PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = StratusRun::parse();

    let lab = LabConfig::from_file(&args.lab_config_file)
        .context("loading lab config")?;
    let logger_config = match &args.logger_config_file {
        Some(path) => LoggerConfig::from_file(path)?,
        None => LoggerConfig::built_in_default()?,
    };
    let database_config = match &args.database_config_file {
        Some(path) => DatabaseConfig::from_file(path)?,
        None => DatabaseConfig::disabled(),
    };
    let runner_config = match &args.runner_config_file {
        Some(path) => RunnerConfig::from_file(path)?,
        None => RunnerConfig::default(),
    };

    let session = SessionLogs::create(&logger_config, &lab.lab_name)
        .context("creating the session log directory")?;
    info!(session.logger, "logs"; "dir" => %session.session_dir);

    let store = database_config
        .use_database
        .then(|| Arc::new(DataStore::new(&session.logger, &database_config)));

    // The disk config is the authoritative view of what the lab can do.
    let lab_tags: BTreeSet<String> =
        lab.lab_capabilities.iter().map(|tag| tag.to_string()).collect();

    let tests = match (&args.tests_location, args.test_plan_id) {
        (Some(tests_location), None) => {
            collect_tests(&args.repo_root, tests_location)
                .context("collecting tests")?
        }
        (None, Some(test_plan_id)) => {
            let Some(store) = &store else {
                bail!(
                    "--test_plan_id requires a database \
                     (--database_config_file)"
                );
            };
            let (plan_name, run_type_id) = store
                .get_test_plan(test_plan_id)
                .await
                .context("loading test plan")?;
            let run_id = store
                .create_run(&plan_name, run_type_id, &runner_config.release)
                .await
                .context("creating run")?;
            let rows = store
                .create_run_content(test_plan_id, run_id)
                .await
                .context("materialising run content")?;
            info!(
                session.logger,
                "run created";
                "run_id" => run_id,
                "tests" => rows,
            );
            store
                .get_tests_for_run(run_id)
                .await
                .context("loading tests for run")?
        }
        _ => {
            bail!(
                "specify exactly one of --tests_location or --test_plan_id"
            );
        }
    };

    let selected = select_tests(tests, &lab_tags);
    info!(
        session.logger,
        "dispatch plan ready";
        "selected" => selected.len(),
        "lab" => &lab.lab_name,
    );

    let runner_host = runner_host_address(&lab.floating_ip);
    let executor = TestExecutor::new(
        &session,
        runner_config,
        &args.repo_root,
        store,
        runner_host,
    );
    executor.execute_all(&selected, args.test_case_result_id).await;

    info!(session.logger, "logs"; "dir" => %session.session_dir);
    // Test failures are recorded above; they are not process failures.
    Ok(())
}
