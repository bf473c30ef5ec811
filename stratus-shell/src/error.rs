// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;
use thiserror::Error;

/// Shell failures, split so callers can react differently: auth and
/// jump-host failures are fatal to the operation in progress, a broken
/// channel has already been retried once, and a timeout names the
/// command that overran.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("authentication failed for {user}@{host}")]
    Auth { host: String, user: String },

    #[error("failed to reach jump host {host}")]
    JumpHost {
        host: String,
        #[source]
        source: russh::Error,
    },

    #[error("shell to {host} is broken: {detail}")]
    Broken { host: String, detail: String },

    #[error("command {command:?} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl ShellError {
    /// Errors worth retrying the command once over a fresh connection.
    pub fn is_channel_level(&self) -> bool {
        matches!(self, ShellError::Broken { .. })
    }
}
