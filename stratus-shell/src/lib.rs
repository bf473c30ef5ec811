// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interactive SSH shells to lab hosts.
//!
//! A [`ShellConnection`] is a long-lived interactive shell, optionally
//! tunneled through a jump host, with the remote prompt captured at
//! connect time.  [`ShellPool`] deduplicates connections per
//! `(host, user, name)`.  CLI output scraping goes through the
//! [`table`] parsers and nothing else.

mod connection;
mod error;
mod pool;
pub mod table;

pub use connection::{PromptResponse, ShellConnection, DEFAULT_SEND_TIMEOUT};
pub use error::ShellError;
pub use pool::ShellPool;
