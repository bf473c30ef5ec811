// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test identity and execution records.

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// The single priority marker a test may carry.  Priority markers are
/// never capability requirements; the planner ignores them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    /// Whether `marker` names a priority rather than a capability.
    pub fn is_priority_marker(marker: &str) -> bool {
        marker.parse::<Priority>().is_ok()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::P0 => "p0",
            Priority::P1 => "p1",
            Priority::P2 => "p2",
            Priority::P3 => "p3",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p0" => Ok(Priority::P0),
            "p1" => Ok(Priority::P1),
            "p2" => Ok(Priority::P2),
            "p3" => Ok(Priority::P3),
            other => Err(format!("not a priority marker: {:?}", other)),
        }
    }
}

/// One collected test.  Identity is stable across collection passes;
/// the id fields are populated when the test came out of the database.
#[derive(Clone, Debug, PartialEq)]
pub struct TestCase {
    /// suite (module) the test belongs to
    pub suite: String,
    /// bare function name
    pub name: String,
    /// node id relative to the repository root, `path::function`
    pub node_id: String,
    /// declared capability markers, priority excluded, order preserved
    pub markers: Vec<String>,
    pub priority: Option<Priority>,
    pub test_info_id: Option<i32>,
    pub run_content_id: Option<i32>,
}

impl TestCase {
    pub fn new(suite: &str, name: &str, node_id: &str) -> TestCase {
        TestCase {
            suite: suite.to_string(),
            name: name.to_string(),
            node_id: node_id.to_string(),
            markers: Vec::new(),
            priority: None,
            test_info_id: None,
            run_content_id: None,
        }
    }
}

/// Execution status of a run-content row.  Transitions are monotonic:
/// once a row has left `NotRun` it can move between terminal states on
/// rerun (latest result wins) but never back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    NotRun,
    Pass,
    Fail,
    Skip,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::NotRun => "NOT_RUN",
            ExecutionStatus::Pass => "PASS",
            ExecutionStatus::Fail => "FAIL",
            ExecutionStatus::Skip => "SKIP",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::NotRun)
    }

    /// Whether moving from `self` to `next` respects monotonicity.
    pub fn may_transition_to(&self, next: ExecutionStatus) -> bool {
        next.is_terminal() || !self.is_terminal()
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_RUN" => Ok(ExecutionStatus::NotRun),
            "PASS" => Ok(ExecutionStatus::Pass),
            "FAIL" => Ok(ExecutionStatus::Fail),
            "SKIP" => Ok(ExecutionStatus::Skip),
            other => Err(format!("unknown execution status {:?}", other)),
        }
    }
}

/// One execution of one test.  Append-only: a rerun inserts a new row
/// rather than touching an old one.
#[derive(Clone, Debug, PartialEq)]
pub struct TestCaseResult {
    pub test_case_result_id: Option<i32>,
    pub test_info_id: i32,
    pub outcome: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub runner_host: String,
    pub log_dir: Option<Utf8PathBuf>,
}

impl TestCaseResult {
    pub fn duration_secs(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// Per-test timing record for an orchestrated platform event.
#[derive(Clone, Debug, PartialEq)]
pub struct UpgradeEvent {
    pub event_name: String,
    pub from_version: String,
    pub to_version: String,
    pub duration_secs: f64,
    pub is_rollback: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_priority_markers() {
        assert!(Priority::is_priority_marker("p0"));
        assert!(Priority::is_priority_marker("p3"));
        assert!(!Priority::is_priority_marker("p4"));
        assert!(!Priority::is_priority_marker("lab_has_worker"));
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        use ExecutionStatus::*;
        assert!(NotRun.may_transition_to(Pass));
        assert!(NotRun.may_transition_to(Skip));
        assert!(Pass.may_transition_to(Fail));
        assert!(Fail.may_transition_to(Pass));
        assert!(!Pass.may_transition_to(NotRun));
        assert!(!Skip.may_transition_to(NotRun));
        assert!(NotRun.may_transition_to(NotRun));
    }

    #[test]
    fn test_result_duration() {
        let start = Utc::now();
        let result = TestCaseResult {
            test_case_result_id: None,
            test_info_id: 7,
            outcome: ExecutionStatus::Pass,
            start_time: start,
            end_time: start + chrono::Duration::milliseconds(1500),
            runner_host: "10.0.0.9".to_string(),
            log_dir: None,
        };
        assert_eq!(result.duration_secs(), 1.5);
    }
}
