// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed access to the platform's bare-metal inventory API.
//!
//! One [`HostInventory`] is fetched per host per scan; probes only ever
//! read these rows.

use crate::error::ScanError;
use serde::Deserialize;
use stratus_rest::RestClient;
use stratus_types::NodeRole;

/// `GET /v1/isystems` (first and only entry).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub distributed_cloud_role: Option<String>,
    #[serde(default)]
    pub capabilities: SystemCapabilities,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SystemCapabilities {
    #[serde(default)]
    pub https_enabled: bool,
}

impl SystemInfo {
    pub fn is_system_controller(&self) -> bool {
        self.distributed_cloud_role.as_deref() == Some("systemcontroller")
    }
}

/// One entry of `GET /v1/ihosts`.
#[derive(Clone, Debug, Deserialize)]
pub struct HostRecord {
    pub uuid: String,
    pub hostname: String,
    pub personality: NodeRole,
    /// comma-separated in the payload, e.g. `"controller,worker"`
    #[serde(default, deserialize_with = "comma_separated")]
    pub subfunctions: Vec<String>,
    #[serde(default)]
    pub mgmt_ip: Option<String>,
    #[serde(default, deserialize_with = "none_string")]
    pub bm_type: Option<String>,
    #[serde(default)]
    pub bm_ip: Option<String>,
    #[serde(default)]
    pub bm_username: Option<String>,
}

impl HostRecord {
    pub fn has_subfunction(&self, name: &str) -> bool {
        self.subfunctions.iter().any(|s| s == name)
    }
}

/// One logical cpu from `GET /v1/ihosts/<uuid>/icpus`.
#[derive(Clone, Debug, Deserialize)]
pub struct CpuRow {
    /// physical socket index
    pub processor: u32,
    pub core: u32,
    /// sibling thread index within the core; > 0 means hyperthreading
    pub thread: u32,
}

/// One entry of `GET /v1/ihosts/<uuid>/imemorys`.
#[derive(Clone, Debug, Deserialize)]
pub struct MemoryRow {
    #[serde(default, rename = "vm_hugepages_nr_1G")]
    pub vm_hugepages_nr_1g: u64,
}

/// One entry of `GET /v1/ihosts/<uuid>/idisks`.
#[derive(Clone, Debug, Deserialize)]
pub struct DiskRow {
    #[serde(default)]
    pub available_mib: u64,
}

/// One entry of `GET /v1/ihosts/<uuid>/iinterfaces`.
#[derive(Clone, Debug, Deserialize)]
pub struct InterfaceRow {
    pub ifname: String,
    #[serde(default)]
    pub ifclass: Option<String>,
    #[serde(default)]
    pub iftype: Option<String>,
}

/// One entry of `GET /v1/ihosts/<uuid>/istors`.
#[derive(Clone, Debug, Deserialize)]
pub struct StorRow {
    #[serde(default)]
    pub function: String,
}

/// Everything the probes read about one host.
#[derive(Clone, Debug, Default)]
pub struct HostInventory {
    pub cpus: Vec<CpuRow>,
    pub memory: Vec<MemoryRow>,
    pub disks: Vec<DiskRow>,
    pub interfaces: Vec<InterfaceRow>,
    pub stors: Vec<StorRow>,
}

/// BMC sensor data gathered once per lab via `ipmitool`.  `None` means
/// the tool was missing or errored; that is deliberately not a failure.
#[derive(Clone, Debug, Default)]
pub struct SensorInfo {
    pub sensor_rows: usize,
}

pub struct InventoryClient<'a> {
    rest: &'a RestClient,
}

impl<'a> InventoryClient<'a> {
    pub fn new(rest: &'a RestClient) -> InventoryClient<'a> {
        InventoryClient { rest }
    }

    pub async fn system_info(&self) -> Result<SystemInfo, ScanError> {
        let payload = self.rest.get_json("/v1/isystems").await?;
        let systems = payload
            .get("isystems")
            .and_then(|value| value.as_array())
            .ok_or_else(|| shape("/v1/isystems", "missing isystems array"))?;
        let first = systems
            .first()
            .ok_or_else(|| shape("/v1/isystems", "empty isystems array"))?;
        serde_json::from_value(first.clone())
            .map_err(|e| shape("/v1/isystems", &e.to_string()))
    }

    /// All hosts, sorted by hostname so probe order is stable.
    pub async fn hosts(&self) -> Result<Vec<HostRecord>, ScanError> {
        let mut hosts: Vec<HostRecord> =
            self.collection("/v1/ihosts", "ihosts").await?;
        hosts.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(hosts)
    }

    pub async fn host_inventory(
        &self,
        host_uuid: &str,
    ) -> Result<HostInventory, ScanError> {
        let base = format!("/v1/ihosts/{}", host_uuid);
        Ok(HostInventory {
            cpus: self
                .collection(&format!("{}/icpus", base), "icpus")
                .await?,
            memory: self
                .collection(&format!("{}/imemorys", base), "imemorys")
                .await?,
            disks: self
                .collection(&format!("{}/idisks", base), "idisks")
                .await?,
            interfaces: self
                .collection(&format!("{}/iinterfaces", base), "iinterfaces")
                .await?,
            stors: self
                .collection(&format!("{}/istors", base), "istors")
                .await?,
        })
    }

    async fn collection<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
    ) -> Result<Vec<T>, ScanError> {
        let payload = self.rest.get_json(path).await?;
        let entries = payload
            .get(key)
            .and_then(|value| value.as_array())
            .ok_or_else(|| shape(path, &format!("missing {} array", key)))?;
        entries
            .iter()
            .map(|entry| {
                serde_json::from_value(entry.clone())
                    .map_err(|e| shape(path, &e.to_string()))
            })
            .collect()
    }
}

fn shape(what: &str, detail: &str) -> ScanError {
    ScanError::Shape { what: what.to_string(), detail: detail.to_string() }
}

fn comma_separated<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

// The API reports "none" for hosts without a BMC.
fn none_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty() && s != "none" && s != "None"))
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_host_record_parses_subfunctions_and_bm_type() {
        let host: HostRecord = serde_json::from_value(json!({
            "uuid": "u-1",
            "hostname": "controller-0",
            "personality": "controller",
            "subfunctions": "controller,worker",
            "mgmt_ip": "192.168.204.2",
            "bm_type": "none",
        }))
        .unwrap();
        assert_eq!(host.personality, NodeRole::Controller);
        assert!(host.has_subfunction("worker"));
        assert!(!host.has_subfunction("lowlatency"));
        assert_eq!(host.bm_type, None);
    }

    #[test]
    fn test_bm_type_survives_when_real() {
        let host: HostRecord = serde_json::from_value(json!({
            "uuid": "u-2",
            "hostname": "compute-1",
            "personality": "worker",
            "bm_type": "redfish",
        }))
        .unwrap();
        assert_eq!(host.bm_type.as_deref(), Some("redfish"));
        assert!(host.subfunctions.is_empty());
    }

    #[test]
    fn test_memory_row_field_name() {
        let row: MemoryRow =
            serde_json::from_value(json!({"vm_hugepages_nr_1G": 4})).unwrap();
        assert_eq!(row.vm_hugepages_nr_1g, 4);
    }

    #[test]
    fn test_system_info_roles() {
        let info: SystemInfo = serde_json::from_value(json!({
            "distributed_cloud_role": "systemcontroller",
            "capabilities": {"https_enabled": true},
        }))
        .unwrap();
        assert!(info.is_system_controller());
        assert!(info.capabilities.https_enabled);

        let standalone: SystemInfo = serde_json::from_value(json!({})).unwrap();
        assert!(!standalone.is_system_controller());
    }
}
