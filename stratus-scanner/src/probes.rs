// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The closed probe registry.
//!
//! A probe is a named, side-effect-free function from the scan context
//! to zero or more capability tags.  All remote state a probe needs
//! (host inventory, sensor output) is gathered ahead of time by the
//! scanner; probes only read.  They run per host in the fixed order of
//! [`PROBES`], which matches the registry order of the tags they emit.

use crate::error::ProbeError;
use crate::inventory::{HostInventory, HostRecord, SensorInfo};
use stratus_config::LabConfig;
use stratus_types::{Capability, CapabilityTag, LabView, NodeRole};

const GIB_30_IN_MIB: u64 = 30 * 1024;
const OSD_MINIMUM: usize = 6;

/// Read-only context a probe evaluates against.
pub struct ProbeCtx<'a> {
    /// the lab being scanned
    pub lab: &'a LabConfig,
    /// the view built so far (hosts probed before this one)
    pub view: &'a LabView,
    /// every host of the current lab
    pub hosts: &'a [HostRecord],
    /// the host being probed
    pub host: &'a HostRecord,
    /// the host's fetched inventory
    pub inventory: &'a HostInventory,
    /// BMC sensor data gathered on the active controller
    pub sensors: &'a SensorInfo,
}

type ProbeResult = Result<Vec<CapabilityTag>, ProbeError>;

pub struct Probe {
    pub name: &'static str,
    run: fn(&ProbeCtx<'_>) -> ProbeResult,
}

impl Probe {
    pub fn run(&self, ctx: &ProbeCtx<'_>) -> ProbeResult {
        (self.run)(ctx)
    }
}

/// The probe set, in execution order.
pub fn registry() -> &'static [Probe] {
    &PROBES
}

static PROBES: [Probe; 16] = [
    Probe { name: "controller_redundancy", run: controller_redundancy },
    Probe { name: "worker_role", run: worker_role },
    Probe { name: "storage_role", run: storage_role },
    Probe { name: "latency_profile", run: latency_profile },
    Probe { name: "hyperthreading", run: hyperthreading },
    Probe { name: "ip_version", run: ip_version },
    Probe { name: "sriov", run: sriov },
    Probe { name: "ae_interface", run: ae_interface },
    Probe { name: "bond_interface", run: bond_interface },
    Probe { name: "physical_interfaces", run: physical_interfaces },
    Probe { name: "disk_space", run: disk_space },
    Probe { name: "processors", run: processors },
    Probe { name: "hugepages", run: hugepages },
    Probe { name: "storage_osds", run: storage_osds },
    Probe { name: "bmc_type", run: bmc_type },
    Probe { name: "bmc_sensor", run: bmc_sensor },
];

fn one(capability: Capability) -> ProbeResult {
    Ok(vec![CapabilityTag::Base(capability)])
}

fn none() -> ProbeResult {
    Ok(Vec::new())
}

// Exactly one controller-role host means simplex; more than one means a
// standby exists.  A lab with no controller at all cannot be scanned.
fn controller_redundancy(ctx: &ProbeCtx<'_>) -> ProbeResult {
    let controllers = ctx
        .hosts
        .iter()
        .filter(|h| h.personality == NodeRole::Controller)
        .count();
    match controllers {
        0 => Err(ProbeError {
            probe: "controller_redundancy",
            host: ctx.host.hostname.clone(),
            detail: "no controller-role host on this lab".to_string(),
        }),
        1 => one(Capability::LabIsSimplex),
        _ => one(Capability::LabHasStandbyController),
    }
}

// A dedicated worker node is a "compute"; the worker tag additionally
// covers AIO controllers carrying the worker sub-function.
fn worker_role(ctx: &ProbeCtx<'_>) -> ProbeResult {
    let mut tags = Vec::new();
    if ctx.host.personality == NodeRole::Worker {
        tags.push(CapabilityTag::Base(Capability::LabHasCompute));
    }
    if ctx.host.personality == NodeRole::Worker
        || ctx.host.has_subfunction("worker")
    {
        tags.push(CapabilityTag::Base(Capability::LabHasWorker));
    }
    Ok(tags)
}

fn storage_role(ctx: &ProbeCtx<'_>) -> ProbeResult {
    if ctx.host.personality == NodeRole::Storage {
        one(Capability::LabHasStorage)
    } else {
        none()
    }
}

fn latency_profile(ctx: &ProbeCtx<'_>) -> ProbeResult {
    if ctx.host.has_subfunction("lowlatency") {
        one(Capability::LabHasLowLatency)
    } else {
        one(Capability::LabHasNonLowLatency)
    }
}

// Sibling threads above index 0 only exist with hyperthreading on.
fn hyperthreading(ctx: &ProbeCtx<'_>) -> ProbeResult {
    if ctx.inventory.cpus.iter().any(|cpu| cpu.thread >= 1) {
        one(Capability::LabHasHyperthreading)
    } else {
        one(Capability::LabHasNoHyperthreading)
    }
}

fn ip_version(ctx: &ProbeCtx<'_>) -> ProbeResult {
    if ctx.lab.is_ipv6() {
        one(Capability::LabIsIpv6)
    } else {
        one(Capability::LabIsIpv4)
    }
}

fn sriov(ctx: &ProbeCtx<'_>) -> ProbeResult {
    let found = ctx
        .inventory
        .interfaces
        .iter()
        .any(|i| i.ifclass.as_deref() == Some("pci-sriov"));
    if found {
        one(Capability::LabHasSriov)
    } else {
        none()
    }
}

fn ae_interface(ctx: &ProbeCtx<'_>) -> ProbeResult {
    if ctx.inventory.interfaces.iter().any(is_ae) {
        one(Capability::LabHasAeInterface)
    } else {
        none()
    }
}

// An aggregated-ethernet interface explicitly named as a bond.
fn bond_interface(ctx: &ProbeCtx<'_>) -> ProbeResult {
    let found = ctx
        .inventory
        .interfaces
        .iter()
        .any(|i| is_ae(i) && i.ifname.contains("bond"));
    if found {
        one(Capability::LabHasBondInterface)
    } else {
        none()
    }
}

fn physical_interfaces(ctx: &ProbeCtx<'_>) -> ProbeResult {
    let physical = ctx
        .inventory
        .interfaces
        .iter()
        .filter(|i| i.iftype.as_deref() == Some("ethernet"))
        .count();
    if physical >= 2 {
        one(Capability::LabHasPhysicalInterfaceMin2)
    } else {
        none()
    }
}

fn disk_space(ctx: &ProbeCtx<'_>) -> ProbeResult {
    let found = ctx
        .inventory
        .disks
        .iter()
        .any(|disk| disk.available_mib >= GIB_30_IN_MIB);
    if found {
        one(Capability::LabHasMinSpace30G)
    } else {
        none()
    }
}

fn processors(ctx: &ProbeCtx<'_>) -> ProbeResult {
    let mut sockets: Vec<u32> =
        ctx.inventory.cpus.iter().map(|cpu| cpu.processor).collect();
    sockets.sort_unstable();
    sockets.dedup();
    if sockets.len() >= 2 {
        one(Capability::LabHasProcessorMin2)
    } else {
        none()
    }
}

fn hugepages(ctx: &ProbeCtx<'_>) -> ProbeResult {
    let found =
        ctx.inventory.memory.iter().any(|row| row.vm_hugepages_nr_1g > 0);
    if found {
        one(Capability::LabHasPageSize1gb)
    } else {
        none()
    }
}

fn storage_osds(ctx: &ProbeCtx<'_>) -> ProbeResult {
    let osds = ctx
        .inventory
        .stors
        .iter()
        .filter(|stor| stor.function == "osd")
        .count();
    if osds >= OSD_MINIMUM {
        one(Capability::LabHasStorage6Osd)
    } else {
        none()
    }
}

fn bmc_type(ctx: &ProbeCtx<'_>) -> ProbeResult {
    match ctx.host.bm_type.as_deref() {
        Some("ipmi") => one(Capability::LabHasBmcIpmi),
        Some("redfish") => one(Capability::LabHasBmcRedfish),
        Some("dynamic") => one(Capability::LabHasBmcDynamic),
        _ => none(),
    }
}

// Silent false when ipmitool was missing or returned nothing: the
// scanner records zero sensor rows in that case rather than failing.
fn bmc_sensor(ctx: &ProbeCtx<'_>) -> ProbeResult {
    if ctx.sensors.sensor_rows > 0 {
        one(Capability::LabBmcSensor)
    } else {
        none()
    }
}

fn is_ae(interface: &crate::inventory::InterfaceRow) -> bool {
    interface.iftype.as_deref() == Some("ae")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inventory::{CpuRow, DiskRow, InterfaceRow, MemoryRow, StorRow};
    use camino_tempfile::Utf8TempDir;
    use std::collections::BTreeSet;
    use stratus_types::LabType;

    struct Fixture {
        lab: LabConfig,
        view: LabView,
        hosts: Vec<HostRecord>,
        inventory: HostInventory,
        sensors: SensorInfo,
        _dir: Utf8TempDir,
    }

    fn host(name: &str, personality: &str, subfunctions: &str) -> HostRecord {
        serde_json::from_value(serde_json::json!({
            "uuid": format!("uuid-{name}"),
            "hostname": name,
            "personality": personality,
            "subfunctions": subfunctions,
            "mgmt_ip": "192.168.204.2",
        }))
        .unwrap()
    }

    fn make_fixture(floating_ip: &str, hosts: Vec<HostRecord>) -> Fixture {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("lab.json5");
        std::fs::write(
            &path,
            format!(
                r#"{{
                    floating_ip: "{floating_ip}",
                    lab_name: "lab-under-test",
                    lab_type: "",
                    admin_credentials: {{
                        user_name: "sysadmin", password: "pw"
                    }},
                    bm_password: "pw",
                    use_jump_server: false,
                }}"#
            ),
        )
        .unwrap();
        Fixture {
            lab: LabConfig::from_file(&path).unwrap(),
            view: LabView {
                lab_name: "lab-under-test".to_string(),
                lab_type: LabType::Simplex,
                tags: BTreeSet::new(),
                nodes: Vec::new(),
                subclouds: Vec::new(),
            },
            hosts,
            inventory: HostInventory::default(),
            sensors: SensorInfo::default(),
            _dir: dir,
        }
    }

    fn run_probe(fixture: &Fixture, name: &str) -> Vec<String> {
        let ctx = ProbeCtx {
            lab: &fixture.lab,
            view: &fixture.view,
            hosts: &fixture.hosts,
            host: &fixture.hosts[0],
            inventory: &fixture.inventory,
            sensors: &fixture.sensors,
        };
        let probe = registry()
            .iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| panic!("no probe named {name}"));
        probe
            .run(&ctx)
            .unwrap()
            .into_iter()
            .map(|tag| tag.to_string())
            .collect()
    }

    #[test]
    fn test_simplex_vs_standby() {
        let fixture = make_fixture(
            "10.0.0.1",
            vec![host("controller-0", "controller", "controller")],
        );
        assert_eq!(
            run_probe(&fixture, "controller_redundancy"),
            vec!["lab_is_simplex"]
        );

        let fixture = make_fixture(
            "10.0.0.1",
            vec![
                host("controller-0", "controller", "controller"),
                host("controller-1", "controller", "controller"),
            ],
        );
        assert_eq!(
            run_probe(&fixture, "controller_redundancy"),
            vec!["lab_has_standby_controller"]
        );
    }

    #[test]
    fn test_no_controller_fails_the_scan() {
        let fixture =
            make_fixture("10.0.0.1", vec![host("compute-0", "worker", "worker")]);
        let ctx = ProbeCtx {
            lab: &fixture.lab,
            view: &fixture.view,
            hosts: &fixture.hosts,
            host: &fixture.hosts[0],
            inventory: &fixture.inventory,
            sensors: &fixture.sensors,
        };
        let probe = registry()
            .iter()
            .find(|p| p.name == "controller_redundancy")
            .unwrap();
        assert!(probe.run(&ctx).is_err());
    }

    #[test]
    fn test_worker_tags_for_aio_controller() {
        let fixture = make_fixture(
            "10.0.0.1",
            vec![host("controller-0", "controller", "controller,worker")],
        );
        // AIO controller: worker, but not compute.
        assert_eq!(run_probe(&fixture, "worker_role"), vec!["lab_has_worker"]);

        let fixture =
            make_fixture("10.0.0.1", vec![host("compute-0", "worker", "worker")]);
        assert_eq!(
            run_probe(&fixture, "worker_role"),
            vec!["lab_has_compute", "lab_has_worker"]
        );
    }

    #[test]
    fn test_latency_profile() {
        let fixture = make_fixture(
            "10.0.0.1",
            vec![host(
                "controller-0",
                "controller",
                "controller,worker,lowlatency",
            )],
        );
        assert_eq!(
            run_probe(&fixture, "latency_profile"),
            vec!["lab_has_low_latency"]
        );

        let fixture = make_fixture(
            "10.0.0.1",
            vec![host("controller-0", "controller", "controller")],
        );
        assert_eq!(
            run_probe(&fixture, "latency_profile"),
            vec!["lab_has_non_low_latency"]
        );
    }

    #[test]
    fn test_ip_version() {
        let fixture = make_fixture(
            "fdff:10:80:221::2",
            vec![host("controller-0", "controller", "controller")],
        );
        assert_eq!(run_probe(&fixture, "ip_version"), vec!["lab_is_ipv6"]);

        let fixture = make_fixture(
            "10.0.0.1",
            vec![host("controller-0", "controller", "controller")],
        );
        assert_eq!(run_probe(&fixture, "ip_version"), vec!["lab_is_ipv4"]);
    }

    #[test]
    fn test_hyperthreading_from_sibling_threads() {
        let mut fixture = make_fixture(
            "10.0.0.1",
            vec![host("controller-0", "controller", "controller")],
        );
        fixture.inventory.cpus = vec![
            CpuRow { processor: 0, core: 0, thread: 0 },
            CpuRow { processor: 0, core: 0, thread: 1 },
        ];
        assert_eq!(
            run_probe(&fixture, "hyperthreading"),
            vec!["lab_has_hyperthreading"]
        );

        fixture.inventory.cpus =
            vec![CpuRow { processor: 0, core: 0, thread: 0 }];
        assert_eq!(
            run_probe(&fixture, "hyperthreading"),
            vec!["lab_has_no_hyperthreading"]
        );
    }

    #[test]
    fn test_interface_probes() {
        let mut fixture = make_fixture(
            "10.0.0.1",
            vec![host("controller-0", "controller", "controller")],
        );
        fixture.inventory.interfaces = vec![
            InterfaceRow {
                ifname: "enp0s3".to_string(),
                ifclass: Some("platform".to_string()),
                iftype: Some("ethernet".to_string()),
            },
            InterfaceRow {
                ifname: "sriov0".to_string(),
                ifclass: Some("pci-sriov".to_string()),
                iftype: Some("ethernet".to_string()),
            },
            InterfaceRow {
                ifname: "bond0".to_string(),
                ifclass: Some("platform".to_string()),
                iftype: Some("ae".to_string()),
            },
        ];
        assert_eq!(run_probe(&fixture, "sriov"), vec!["lab_has_sriov"]);
        assert_eq!(
            run_probe(&fixture, "ae_interface"),
            vec!["lab_has_ae_interface"]
        );
        assert_eq!(
            run_probe(&fixture, "bond_interface"),
            vec!["lab_has_bond_interface"]
        );
        assert_eq!(
            run_probe(&fixture, "physical_interfaces"),
            vec!["lab_has_physical_interface_min_2"]
        );

        // An ae interface not named bond* is not a declared bond.
        fixture.inventory.interfaces[2].ifname = "ae0".to_string();
        assert!(run_probe(&fixture, "bond_interface").is_empty());
    }

    #[test]
    fn test_capacity_probes() {
        let mut fixture = make_fixture(
            "10.0.0.1",
            vec![host("storage-0", "storage", "storage")],
        );
        fixture.inventory.disks = vec![DiskRow { available_mib: 40960 }];
        fixture.inventory.cpus = vec![
            CpuRow { processor: 0, core: 0, thread: 0 },
            CpuRow { processor: 1, core: 0, thread: 0 },
        ];
        fixture.inventory.memory = vec![MemoryRow { vm_hugepages_nr_1g: 2 }];
        fixture.inventory.stors = (0..6)
            .map(|_| StorRow { function: "osd".to_string() })
            .collect();

        assert_eq!(
            run_probe(&fixture, "disk_space"),
            vec!["lab_has_min_space_30G"]
        );
        assert_eq!(
            run_probe(&fixture, "processors"),
            vec!["lab_has_processor_min_2"]
        );
        assert_eq!(
            run_probe(&fixture, "hugepages"),
            vec!["lab_has_page_size_1gb"]
        );
        assert_eq!(
            run_probe(&fixture, "storage_osds"),
            vec!["lab_has_storage_6_osd"]
        );

        fixture.inventory.disks = vec![DiskRow { available_mib: 1024 }];
        assert!(run_probe(&fixture, "disk_space").is_empty());
        fixture.inventory.stors.pop();
        assert!(run_probe(&fixture, "storage_osds").is_empty());
    }

    #[test]
    fn test_bmc_probes() {
        let mut fixture = make_fixture(
            "10.0.0.1",
            vec![host("controller-0", "controller", "controller")],
        );
        assert!(run_probe(&fixture, "bmc_type").is_empty());

        fixture.hosts[0].bm_type = Some("ipmi".to_string());
        assert_eq!(run_probe(&fixture, "bmc_type"), vec!["lab_has_bmc_ipmi"]);

        fixture.hosts[0].bm_type = Some("dynamic".to_string());
        assert_eq!(
            run_probe(&fixture, "bmc_type"),
            vec!["lab_has_bmc_dynamic"]
        );

        // Missing ipmitool shows up as zero sensor rows: silently no tag.
        assert!(run_probe(&fixture, "bmc_sensor").is_empty());
        fixture.sensors.sensor_rows = 12;
        assert_eq!(run_probe(&fixture, "bmc_sensor"), vec!["lab_bmc_sensor"]);
    }
}
