// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lab capability discovery.
//!
//! The scanner inspects one lab through its REST inventory API and an
//! interactive shell, runs the closed probe set over every host, and
//! produces a [`stratus_types::LabView`]: the merged capability tag set,
//! per-node tags, and the derived lab type.  For a central cloud it
//! additionally scans every managed+online subcloud and imports the
//! subcloud tags under the `subcloud_` prefix.  Results are persisted
//! back to the lab config file (atomically) and, when configured, to the
//! result store.

mod error;
mod inventory;
mod probes;
mod scanner;

pub use error::{ProbeError, ScanError};
pub use inventory::{
    CpuRow, DiskRow, HostInventory, HostRecord, InterfaceRow,
    InventoryClient, MemoryRow, SensorInfo, StorRow, SystemInfo,
};
pub use probes::{registry, Probe, ProbeCtx};
pub use scanner::{ScanOutcome, Scanner};
