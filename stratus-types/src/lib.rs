// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core data model shared across the harness: the closed capability
//! registry, the scanned view of a lab, and test/run records.

mod capability;
mod testcase;
mod view;

pub use capability::{Capability, CapabilityTag, UnknownCapability};
pub use testcase::{
    ExecutionStatus, Priority, TestCase, TestCaseResult, UpgradeEvent,
};
pub use view::{derive_lab_type, LabType, NodeRole, NodeView, LabView};
