// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The closed registry of capability tags.
//!
//! A tag asserts a physical fact about a lab.  The registry is closed:
//! a tag string that does not name a [`Capability`] (optionally behind
//! the `subcloud_` prefix) does not parse, and lab configs referencing
//! one fail to load.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Every capability the harness knows about, in registry order.
///
/// The declaration order here is load-bearing: it is the order probes
/// run in and the order tags serialise in, so scans stay byte-stable.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
pub enum Capability {
    #[strum(serialize = "lab_is_simplex")]
    LabIsSimplex,
    #[strum(serialize = "lab_has_standby_controller")]
    LabHasStandbyController,
    #[strum(serialize = "lab_has_worker")]
    LabHasWorker,
    #[strum(serialize = "lab_has_compute")]
    LabHasCompute,
    #[strum(serialize = "lab_has_storage")]
    LabHasStorage,
    #[strum(serialize = "lab_has_low_latency")]
    LabHasLowLatency,
    #[strum(serialize = "lab_has_non_low_latency")]
    LabHasNonLowLatency,
    #[strum(serialize = "lab_has_hyperthreading")]
    LabHasHyperthreading,
    #[strum(serialize = "lab_has_no_hyperthreading")]
    LabHasNoHyperthreading,
    #[strum(serialize = "lab_is_ipv4")]
    LabIsIpv4,
    #[strum(serialize = "lab_is_ipv6")]
    LabIsIpv6,
    #[strum(serialize = "lab_has_sriov")]
    LabHasSriov,
    #[strum(serialize = "lab_has_ae_interface")]
    LabHasAeInterface,
    #[strum(serialize = "lab_has_bond_interface")]
    LabHasBondInterface,
    #[strum(serialize = "lab_has_physical_interface_min_2")]
    LabHasPhysicalInterfaceMin2,
    #[strum(serialize = "lab_has_min_space_30G")]
    LabHasMinSpace30G,
    #[strum(serialize = "lab_has_processor_min_2")]
    LabHasProcessorMin2,
    #[strum(serialize = "lab_has_page_size_1gb")]
    LabHasPageSize1gb,
    #[strum(serialize = "lab_has_storage_6_osd")]
    LabHasStorage6Osd,
    #[strum(serialize = "lab_has_bmc_ipmi")]
    LabHasBmcIpmi,
    #[strum(serialize = "lab_has_bmc_redfish")]
    LabHasBmcRedfish,
    #[strum(serialize = "lab_has_bmc_dynamic")]
    LabHasBmcDynamic,
    #[strum(serialize = "lab_bmc_sensor")]
    LabBmcSensor,
    #[strum(serialize = "lab_has_subcloud")]
    LabHasSubcloud,
    #[strum(serialize = "lab_has_min_2_subclouds")]
    LabHasMin2Subclouds,
}

#[derive(Clone, Debug, Error, PartialEq)]
#[error("unknown capability tag {tag:?}")]
pub struct UnknownCapability {
    pub tag: String,
}

/// A capability tag as it appears in configs and the database: either a
/// registry member, or a registry member a central cloud inherited from
/// one of its subclouds.
///
/// Base tags order before inherited tags, each group in registry order,
/// so `BTreeSet<CapabilityTag>` iterates in the serialisation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapabilityTag {
    Base(Capability),
    Subcloud(Capability),
}

const SUBCLOUD_PREFIX: &str = "subcloud_";

impl CapabilityTag {
    /// The tag a central cloud carries for `self` present on a subcloud.
    ///
    /// Only defined for base tags: the recursion depth bound means a
    /// subcloud can never itself hold inherited tags.
    pub fn inherited(self) -> Option<CapabilityTag> {
        match self {
            CapabilityTag::Base(c) => Some(CapabilityTag::Subcloud(c)),
            CapabilityTag::Subcloud(_) => None,
        }
    }
}

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityTag::Base(c) => write!(f, "{}", c),
            CapabilityTag::Subcloud(c) => {
                write!(f, "{}{}", SUBCLOUD_PREFIX, c)
            }
        }
    }
}

impl FromStr for CapabilityTag {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (make, base): (fn(Capability) -> CapabilityTag, &str) =
            match s.strip_prefix(SUBCLOUD_PREFIX) {
                Some(rest) => (CapabilityTag::Subcloud, rest),
                None => (CapabilityTag::Base, s),
            };
        Capability::from_str(base)
            .map(make)
            .map_err(|_| UnknownCapability { tag: s.to_string() })
    }
}

impl From<Capability> for CapabilityTag {
    fn from(c: Capability) -> Self {
        CapabilityTag::Base(c)
    }
}

impl Serialize for CapabilityTag {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CapabilityTag {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(|e: UnknownCapability| D::Error::custom(e))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeSet;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_tag_round_trips() {
        for capability in Capability::iter() {
            let base = CapabilityTag::Base(capability);
            assert_eq!(base, base.to_string().parse().unwrap());
            let inherited = base.inherited().unwrap();
            assert!(inherited.to_string().starts_with("subcloud_"));
            assert_eq!(inherited, inherited.to_string().parse().unwrap());
        }
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert_eq!(
            "lab_has_flux_capacitor".parse::<CapabilityTag>(),
            Err(UnknownCapability {
                tag: "lab_has_flux_capacitor".to_string()
            })
        );
        // An unknown tag behind the subcloud prefix is just as unknown.
        assert!("subcloud_lab_has_flux_capacitor"
            .parse::<CapabilityTag>()
            .is_err());
    }

    #[test]
    fn test_exact_spellings() {
        assert_eq!(
            Capability::LabHasMinSpace30G.to_string(),
            "lab_has_min_space_30G"
        );
        assert_eq!(
            Capability::LabHasPhysicalInterfaceMin2.to_string(),
            "lab_has_physical_interface_min_2"
        );
        assert_eq!(
            CapabilityTag::Subcloud(Capability::LabIsIpv6).to_string(),
            "subcloud_lab_is_ipv6"
        );
    }

    #[test]
    fn test_ordering_is_registry_order_base_first() {
        let mut tags = BTreeSet::new();
        tags.insert(CapabilityTag::Subcloud(Capability::LabIsSimplex));
        tags.insert(CapabilityTag::Base(Capability::LabHasSubcloud));
        tags.insert(CapabilityTag::Base(Capability::LabIsSimplex));
        let ordered: Vec<String> =
            tags.iter().map(|t| t.to_string()).collect();
        assert_eq!(
            ordered,
            vec![
                "lab_is_simplex",
                "lab_has_subcloud",
                "subcloud_lab_is_simplex"
            ]
        );
    }

    #[test]
    fn test_serde_as_string() {
        let tag: CapabilityTag = serde_json::from_str("\"lab_has_sriov\"")
            .expect("known tag deserialises");
        assert_eq!(tag, CapabilityTag::Base(Capability::LabHasSriov));
        assert!(serde_json::from_str::<CapabilityTag>("\"lab_has_vibes\"")
            .is_err());
    }
}
