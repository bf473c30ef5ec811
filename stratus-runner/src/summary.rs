// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-run results summary, logged once everything has executed.

use slog::{info, Logger};
use stratus_types::ExecutionStatus;

#[derive(Debug, Default)]
pub struct ExecutorSummary {
    lines: Vec<String>,
    passed: usize,
    failed: usize,
    skipped: usize,
}

impl ExecutorSummary {
    pub fn new() -> ExecutorSummary {
        ExecutorSummary::default()
    }

    pub fn record(&mut self, node_id: &str, outcome: ExecutionStatus) {
        match outcome {
            ExecutionStatus::Pass => self.passed += 1,
            ExecutionStatus::Fail => self.failed += 1,
            ExecutionStatus::Skip => self.skipped += 1,
            ExecutionStatus::NotRun => {}
        }
        self.lines.push(format!("{:<8}{}", outcome, node_id));
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.passed, self.failed, self.skipped)
    }

    pub fn log(&self, log: &Logger) {
        info!(log, "");
        info!(log, "Results Summary:");
        for line in &self.lines {
            info!(log, "{}", line);
        }
        info!(
            log,
            "{} passed, {} failed, {} skipped",
            self.passed,
            self.failed,
            self.skipped
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_counts() {
        let mut summary = ExecutorSummary::new();
        summary.record("a.py::t1", ExecutionStatus::Pass);
        summary.record("a.py::t2", ExecutionStatus::Fail);
        summary.record("a.py::t3", ExecutionStatus::Pass);
        summary.record("a.py::t4", ExecutionStatus::Skip);
        assert_eq!(summary.counts(), (2, 1, 1));
    }
}
