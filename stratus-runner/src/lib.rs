// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test dispatch: collect the catalogue, plan the subset the lab can
//! run, execute each test in an isolated worker, and record outcomes.

mod catalogue;
mod executor;
mod planner;
mod summary;

pub use catalogue::{collect_tests, CatalogueError};
pub use executor::{runner_host_address, TestExecutor};
pub use planner::select_tests;
pub use summary::ExecutorSummary;
