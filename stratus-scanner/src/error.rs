// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// A probe refused to produce an answer.  Probe failures are never
/// partial: the whole scan is discarded.
#[derive(Debug, Error)]
#[error("probe {probe} failed on {host}: {detail}")]
pub struct ProbeError {
    pub probe: &'static str,
    pub host: String,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] stratus_config::LoadError),

    #[error(transparent)]
    Shell(#[from] stratus_shell::ShellError),

    #[error(transparent)]
    Rest(#[from] stratus_rest::RestError),

    #[error(transparent)]
    Table(#[from] stratus_shell::table::TableParseError),

    #[error("unexpected payload from {what}: {detail}")]
    Shape { what: String, detail: String },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(
        "{lab} reports itself as a system controller while being \
         scanned as a subcloud; nesting is bounded to central -> subcloud"
    )]
    TopologyTooDeep { lab: String },

    #[error("subcloud scans failed")]
    Subclouds(#[source] named_task_set::TaskSetError),
}
