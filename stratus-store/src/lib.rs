// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The result store: an append-only record of runs, per-test outcomes,
//! and per-event timings in a PostgreSQL database.
//!
//! The store is advisory.  Write paths go through
//! [`DataStore::write_with_retry`], which blocks through DNS-shaped
//! outages and swallows (but logs) everything else; the test run itself
//! is the source of truth.  Read paths propagate errors normally.
//!
//! The schema lives in `schema.sql` next to this crate.

mod datastore;
mod error;
mod operations;
mod pool;

pub use datastore::{DataStore, DNS_RETRY_INTERVAL};
pub use error::StoreError;
pub use pool::Pool;
