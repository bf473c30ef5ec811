// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use camino::Utf8PathBuf;
use stratus_types::UnknownCapability;
use thiserror::Error;

/// Errors loading or rewriting the configuration tree.  All of these
/// are fatal: a scan or run never proceeds on a broken config.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("error parsing \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: json5::Error,
    },

    #[error("in \"{path}\": {err}")]
    UnknownTag {
        path: Utf8PathBuf,
        #[source]
        err: UnknownCapability,
    },

    #[error("in \"{path}\": {err}")]
    BadValue { path: Utf8PathBuf, err: String },

    #[error("subcloud reference cycle through \"{path}\"")]
    Cycle { path: Utf8PathBuf },

    #[error(
        "\"{path}\": subclouds may not themselves reference subclouds \
         (nesting is bounded to central -> subcloud)"
    )]
    TooDeep { path: Utf8PathBuf },

    #[error("\"{path}\": {reason}")]
    InvalidTopology { path: Utf8PathBuf, reason: String },

    #[error("cannot determine home directory for \"DEFAULT\" log location")]
    MissingHome,
}
