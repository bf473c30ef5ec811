// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The scanned view of a lab: per-node facts, the merged tag set, and
//! the derived lab type.

use crate::capability::CapabilityTag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Role a node plays in the platform.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    Serialize,
    Deserialize,
)]
pub enum NodeRole {
    #[strum(serialize = "controller")]
    #[serde(rename = "controller")]
    Controller,
    #[strum(serialize = "worker")]
    #[serde(rename = "worker")]
    Worker,
    #[strum(serialize = "storage")]
    #[serde(rename = "storage")]
    Storage,
}

/// Deployment shape of a lab, derived from its node roles and
/// sub-functions.  Total: every combination maps to exactly one type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabType {
    Simplex,
    Duplex,
    AioPlus,
    Standard,
    Storage,
}

impl fmt::Display for LabType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LabType::Simplex => "Simplex",
            LabType::Duplex => "Duplex",
            LabType::AioPlus => "AIO+",
            LabType::Standard => "Standard",
            LabType::Storage => "Storage",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LabType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Simplex" => Ok(LabType::Simplex),
            "Duplex" => Ok(LabType::Duplex),
            "AIO+" => Ok(LabType::AioPlus),
            "Standard" => Ok(LabType::Standard),
            "Storage" => Ok(LabType::Storage),
            other => Err(format!("unknown lab type {:?}", other)),
        }
    }
}

/// One node's slice of a scan: identity, inventory-derived facts, and
/// the tags its probes emitted.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeView {
    pub name: String,
    pub ip: Option<String>,
    pub role: NodeRole,
    pub sub_functions: Vec<String>,
    pub bm_type: Option<String>,
    pub bm_ip: Option<String>,
    pub bm_username: Option<String>,
    pub tags: BTreeSet<CapabilityTag>,
}

impl NodeView {
    pub fn has_sub_function(&self, name: &str) -> bool {
        self.sub_functions.iter().any(|s| s == name)
    }
}

/// The result of scanning one lab.  For a central cloud, `subclouds`
/// holds one view per subcloud that was managed and online at scan time.
#[derive(Clone, Debug, PartialEq)]
pub struct LabView {
    pub lab_name: String,
    pub lab_type: LabType,
    pub tags: BTreeSet<CapabilityTag>,
    pub nodes: Vec<NodeView>,
    pub subclouds: Vec<LabView>,
}

impl LabView {
    pub fn controller_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.role == NodeRole::Controller)
            .count()
    }

    /// Tag set rendered to strings, for matching against test markers.
    pub fn tag_strings(&self) -> BTreeSet<String> {
        self.tags.iter().map(|t| t.to_string()).collect()
    }
}

/// Derive the lab type from the node roles and sub-functions:
///
/// - one controller (or none): Simplex
/// - >= 2 controllers, storage or worker nodes present, and >= 2
///   controllers carrying the `worker` sub-function: AIO+
/// - >= 1 storage node: Storage
/// - >= 1 worker node: Standard
/// - otherwise: Duplex
pub fn derive_lab_type(nodes: &[NodeView]) -> LabType {
    let controllers: Vec<&NodeView> =
        nodes.iter().filter(|n| n.role == NodeRole::Controller).collect();
    let workers =
        nodes.iter().filter(|n| n.role == NodeRole::Worker).count();
    let storage =
        nodes.iter().filter(|n| n.role == NodeRole::Storage).count();

    if controllers.len() < 2 {
        return LabType::Simplex;
    }
    let aio_controllers =
        controllers.iter().filter(|c| c.has_sub_function("worker")).count();
    if (storage > 0 || workers > 0) && aio_controllers >= 2 {
        return LabType::AioPlus;
    }
    if storage > 0 {
        return LabType::Storage;
    }
    if workers > 0 {
        return LabType::Standard;
    }
    LabType::Duplex
}

#[cfg(test)]
mod test {
    use super::*;

    fn node(name: &str, role: NodeRole, subs: &[&str]) -> NodeView {
        NodeView {
            name: name.to_string(),
            ip: None,
            role,
            sub_functions: subs.iter().map(|s| s.to_string()).collect(),
            bm_type: None,
            bm_ip: None,
            bm_username: None,
            tags: BTreeSet::new(),
        }
    }

    #[test]
    fn test_lab_type_simplex() {
        let nodes =
            [node("controller-0", NodeRole::Controller, &["controller"])];
        assert_eq!(derive_lab_type(&nodes), LabType::Simplex);
    }

    #[test]
    fn test_lab_type_duplex() {
        let nodes = [
            node("controller-0", NodeRole::Controller, &[]),
            node("controller-1", NodeRole::Controller, &[]),
        ];
        assert_eq!(derive_lab_type(&nodes), LabType::Duplex);
    }

    #[test]
    fn test_lab_type_aio_plus() {
        let nodes = [
            node("controller-0", NodeRole::Controller, &["worker"]),
            node("controller-1", NodeRole::Controller, &["worker"]),
            node("worker-0", NodeRole::Worker, &[]),
        ];
        assert_eq!(derive_lab_type(&nodes), LabType::AioPlus);
    }

    #[test]
    fn test_lab_type_storage_beats_standard() {
        let nodes = [
            node("controller-0", NodeRole::Controller, &[]),
            node("controller-1", NodeRole::Controller, &[]),
            node("storage-0", NodeRole::Storage, &[]),
            node("worker-0", NodeRole::Worker, &[]),
        ];
        assert_eq!(derive_lab_type(&nodes), LabType::Storage);
    }

    #[test]
    fn test_lab_type_standard() {
        let nodes = [
            node("controller-0", NodeRole::Controller, &[]),
            node("controller-1", NodeRole::Controller, &[]),
            node("worker-0", NodeRole::Worker, &[]),
        ];
        assert_eq!(derive_lab_type(&nodes), LabType::Standard);
    }

    #[test]
    fn test_lab_type_single_aio_controller_is_not_aio_plus() {
        // Only one controller carries the worker sub-function, so the
        // storage node decides the type.
        let nodes = [
            node("controller-0", NodeRole::Controller, &["worker"]),
            node("controller-1", NodeRole::Controller, &[]),
            node("storage-0", NodeRole::Storage, &[]),
        ];
        assert_eq!(derive_lab_type(&nodes), LabType::Storage);
    }

    #[test]
    fn test_lab_type_display_round_trip() {
        for t in [
            LabType::Simplex,
            LabType::Duplex,
            LabType::AioPlus,
            LabType::Standard,
            LabType::Storage,
        ] {
            assert_eq!(t, t.to_string().parse().unwrap());
        }
    }
}
