// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scan a lab for capabilities and rewrite its config file.
//!
//! The scan is idempotent: running it twice against an unchanged lab
//! rewrites the config byte-identically (modulo `.bak` rotation).
//! Exits non-zero only on fatal errors; skipped subclouds are warnings.

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use slog::info;
use std::sync::Arc;
use stratus_config::{DatabaseConfig, LabConfig, LoggerConfig};
use stratus_log::SessionLogs;
use stratus_scanner::Scanner;
use stratus_store::DataStore;

/// Lab capability scanner
#[derive(Debug, Parser)]
struct StratusScan {
    /// the lab config file to scan and rewrite
    #[arg(long = "lab_config_file")]
    lab_config_file: Utf8PathBuf,

    /// override the config's floating IP for this scan
    #[arg(long = "floating_ip")]
    floating_ip: Option<String>,

    /// logger config file (defaults to ~/AUTOMATION_LOGS, INFO console)
    #[arg(long = "logger_config_file")]
    logger_config_file: Option<Utf8PathBuf>,

    /// database config file (defaults to no database)
    #[arg(long = "database_config_file")]
    database_config_file: Option<Utf8PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = StratusScan::parse();

    let mut lab = LabConfig::from_file(&args.lab_config_file)
        .context("loading lab config")?;
    if let Some(floating_ip) = args.floating_ip {
        lab.floating_ip = floating_ip;
    }

    let logger_config = match &args.logger_config_file {
        Some(path) => LoggerConfig::from_file(path)?,
        None => LoggerConfig::built_in_default()?,
    };
    let database_config = match &args.database_config_file {
        Some(path) => DatabaseConfig::from_file(path)?,
        None => DatabaseConfig::disabled(),
    };

    let session = SessionLogs::create(&logger_config, &lab.lab_name)
        .context("creating the session log directory")?;
    info!(session.logger, "logs"; "dir" => %session.session_dir);

    let store = database_config
        .use_database
        .then(|| Arc::new(DataStore::new(&session.logger, &database_config)));

    let scanner = Scanner::new(&session.logger, store);
    let outcome = scanner.scan(&lab).await.context("scan failed")?;

    info!(
        session.logger,
        "lab scanned";
        "lab" => &outcome.config.lab_name,
        "lab_type" => %outcome.view.lab_type,
        "config" => %outcome.config.config_path,
    );
    for tag in &outcome.view.tags {
        info!(session.logger, "capability"; "tag" => %tag);
    }
    Ok(())
}
