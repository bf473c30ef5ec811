// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("executing {sql:?}")]
    Sql {
        sql: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("extracting column {column:?} from row")]
    Deserialize {
        column: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("executing {sql:?}: expected one row, found {nrows_found}")]
    BadRowCount { sql: String, nrows_found: u64 },

    #[error("failed to acquire database connection: {message}")]
    Unavailable { message: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error(
        "refusing non-monotonic run content transition {from} -> {to} \
         for run_content_id {run_content_id}"
    )]
    Monotonicity { run_content_id: i32, from: String, to: String },
}

impl StoreError {
    /// Whether this is a "database currently unreachable by name"
    /// failure, which write paths wait out at a fixed interval rather
    /// than giving up.
    pub fn is_transient(&self) -> bool {
        text_is_transient(&self.chain_text())
    }

    // Flatten Display output of this error and its sources; transient
    // classification is by message because the resolver failure is
    // buried in an io::Error several layers down.
    fn chain_text(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            text.push_str(": ");
            text.push_str(&err.to_string());
            source = err.source();
        }
        text
    }
}

fn text_is_transient(text: &str) -> bool {
    // glibc and musl spell the EAI_NONAME failure differently.
    text.contains("Name or service not known")
        || text.contains("failed to lookup address information")
}
