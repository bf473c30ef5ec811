// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lab configuration: the on-disk description of a physical lab, its
//! nodes, and (for a central cloud) its subclouds.

use crate::error::LoadError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use stratus_types::{CapabilityTag, NodeRole};

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Credentials {
    pub user_name: String,
    pub password: String,
}

/// A jump host sitting between the harness and the lab, described by its
/// own JSON5 file referenced from the lab config.
#[derive(Clone, Debug, PartialEq)]
pub struct JumpHostConfig {
    pub host: String,
    pub credentials: Credentials,
    pub ssh_port: u16,
    /// path the lab config referenced, kept for rewriting
    pub config_path: Utf8PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawJumpHostConfig {
    host: String,
    credentials: Credentials,
    ssh_port: Option<u16>,
}

/// One node of a lab.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeConfig {
    pub name: String,
    pub ip: String,
    pub role: NodeRole,
    pub capabilities: BTreeSet<CapabilityTag>,
    pub sub_functions: Vec<String>,
    pub bm_ip: Option<String>,
    pub bm_username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNodeConfig {
    ip: String,
    node_type: String,
    #[serde(default)]
    node_capabilities: Vec<String>,
    #[serde(default)]
    sub_functions: Vec<String>,
    bm_ip: Option<String>,
    bm_username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLabConfig {
    floating_ip: String,
    lab_name: String,
    lab_type: String,
    admin_credentials: Credentials,
    bm_password: String,
    use_jump_server: bool,
    jump_server_config: Option<Utf8PathBuf>,
    ssh_port: Option<u16>,
    horizon_url: Option<String>,
    horizon_credentials: Option<Credentials>,
    rest_credentials: Option<Credentials>,
    is_dc: Option<bool>,
    system_controller_ip: Option<String>,
    system_controller_name: Option<String>,
    secondary_system_controller: Option<Utf8PathBuf>,
    #[serde(default)]
    lab_capabilities: Vec<String>,
    #[serde(default)]
    nodes: BTreeMap<String, RawNodeConfig>,
    #[serde(default)]
    subclouds: BTreeMap<String, Utf8PathBuf>,
}

/// Immutable description of a physical lab.
///
/// A lab is exactly one of: standalone (no subclouds, no back-reference),
/// central (subclouds, no back-reference), or subcloud (back-reference,
/// no subclouds).  Loading enforces this and rejects reference cycles.
#[derive(Clone, Debug, PartialEq)]
pub struct LabConfig {
    pub floating_ip: String,
    pub lab_name: String,
    pub lab_type: String,
    pub admin_credentials: Credentials,
    pub bm_password: String,
    pub use_jump_server: bool,
    pub jump_host: Option<JumpHostConfig>,
    pub ssh_port: u16,
    pub horizon_url: Option<String>,
    pub horizon_credentials: Credentials,
    pub rest_credentials: Credentials,
    pub is_dc: bool,
    pub system_controller_ip: Option<String>,
    pub system_controller_name: Option<String>,
    pub secondary_system_controller: Option<Utf8PathBuf>,
    pub lab_capabilities: BTreeSet<CapabilityTag>,
    pub nodes: Vec<NodeConfig>,
    pub subclouds: Vec<LabConfig>,
    /// file this config was loaded from (and is rewritten to)
    pub config_path: Utf8PathBuf,
}

impl LabConfig {
    /// Load a `LabConfig` from the given JSON5 file, resolving subcloud
    /// references transitively.
    pub fn from_file(path: &Utf8Path) -> Result<LabConfig, LoadError> {
        let mut stack = Vec::new();
        Self::load(path, &mut stack, 0)
    }

    fn load(
        path: &Utf8Path,
        stack: &mut Vec<Utf8PathBuf>,
        depth: usize,
    ) -> Result<LabConfig, LoadError> {
        let canonical = canonicalize_for_cycle_check(path);
        if stack.contains(&canonical) {
            return Err(LoadError::Cycle { path: path.to_owned() });
        }
        stack.push(canonical);
        let result = Self::load_inner(path, stack, depth);
        stack.pop();
        result
    }

    fn load_inner(
        path: &Utf8Path,
        stack: &mut Vec<Utf8PathBuf>,
        depth: usize,
    ) -> Result<LabConfig, LoadError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.to_owned(), err })?;
        let raw: RawLabConfig = json5::from_str(&contents)
            .map_err(|err| LoadError::Parse { path: path.to_owned(), err })?;

        if !raw.subclouds.is_empty() {
            if depth > 0 {
                return Err(LoadError::TooDeep { path: path.to_owned() });
            }
            if raw.system_controller_name.is_some()
                || raw.system_controller_ip.is_some()
            {
                return Err(LoadError::InvalidTopology {
                    path: path.to_owned(),
                    reason: "a lab cannot both reference a system \
                             controller and own subclouds"
                        .to_string(),
                });
            }
        }

        let lab_capabilities = parse_tags(path, &raw.lab_capabilities)?;

        let mut nodes = Vec::with_capacity(raw.nodes.len());
        for (name, raw_node) in &raw.nodes {
            nodes.push(NodeConfig {
                name: name.clone(),
                ip: raw_node.ip.clone(),
                role: raw_node.node_type.parse().map_err(|_| {
                    LoadError::BadValue {
                        path: path.to_owned(),
                        err: format!(
                            "node {:?} has unknown node_type {:?}",
                            name, raw_node.node_type
                        ),
                    }
                })?,
                capabilities: parse_tags(path, &raw_node.node_capabilities)?,
                sub_functions: raw_node.sub_functions.clone(),
                bm_ip: raw_node.bm_ip.clone(),
                bm_username: raw_node.bm_username.clone(),
            });
        }
        // BTreeMap already yields nodes sorted by name; keep that order.

        let mut subclouds = Vec::with_capacity(raw.subclouds.len());
        for reference in raw.subclouds.values() {
            let subcloud_path = resolve_relative(path, reference);
            subclouds.push(Self::load(&subcloud_path, stack, depth + 1)?);
        }

        let jump_host = match (raw.use_jump_server, &raw.jump_server_config) {
            (true, Some(reference)) => {
                Some(JumpHostConfig::from_file(
                    &resolve_relative(path, reference),
                    reference.clone(),
                )?)
            }
            (true, None) => {
                return Err(LoadError::BadValue {
                    path: path.to_owned(),
                    err: "use_jump_server is set but jump_server_config \
                          is missing"
                        .to_string(),
                });
            }
            (false, _) => None,
        };

        let default_rest = Credentials {
            user_name: "admin".to_string(),
            password: raw.admin_credentials.password.clone(),
        };

        Ok(LabConfig {
            floating_ip: raw.floating_ip,
            lab_name: raw.lab_name,
            lab_type: raw.lab_type,
            horizon_credentials: raw
                .horizon_credentials
                .unwrap_or_else(|| default_rest.clone()),
            rest_credentials: raw
                .rest_credentials
                .unwrap_or_else(|| default_rest.clone()),
            admin_credentials: raw.admin_credentials,
            bm_password: raw.bm_password,
            use_jump_server: raw.use_jump_server,
            jump_host,
            ssh_port: raw.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
            horizon_url: raw.horizon_url,
            is_dc: raw.is_dc.unwrap_or(!subclouds.is_empty()),
            system_controller_ip: raw.system_controller_ip,
            system_controller_name: raw.system_controller_name,
            secondary_system_controller: raw.secondary_system_controller,
            lab_capabilities,
            nodes,
            subclouds,
            config_path: path.to_owned(),
        })
    }

    /// IPv4 vs IPv6 is detected by the presence of `:` in the floating
    /// IP.
    pub fn is_ipv6(&self) -> bool {
        self.floating_ip.contains(':')
    }

    /// Whether this lab is a subcloud of some central cloud.
    pub fn is_subcloud(&self) -> bool {
        self.system_controller_name.is_some()
    }

    pub fn node(&self, name: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Seed a config for a newly discovered subcloud that has no file on
    /// disk yet: the central config with an empty floating IP, the
    /// subcloud's name, and none of the central cloud's scan output.
    pub fn seeded_subcloud(
        &self,
        subcloud_name: &str,
        config_path: Utf8PathBuf,
    ) -> LabConfig {
        LabConfig {
            floating_ip: String::new(),
            lab_name: subcloud_name.to_string(),
            lab_type: String::new(),
            admin_credentials: self.admin_credentials.clone(),
            bm_password: self.bm_password.clone(),
            use_jump_server: self.use_jump_server,
            jump_host: self.jump_host.clone(),
            ssh_port: self.ssh_port,
            horizon_url: None,
            horizon_credentials: self.horizon_credentials.clone(),
            rest_credentials: self.rest_credentials.clone(),
            is_dc: false,
            system_controller_ip: None,
            system_controller_name: None,
            secondary_system_controller: None,
            lab_capabilities: BTreeSet::new(),
            nodes: Vec::new(),
            subclouds: Vec::new(),
            config_path,
        }
    }
}

impl JumpHostConfig {
    fn from_file(
        path: &Utf8Path,
        reference: Utf8PathBuf,
    ) -> Result<JumpHostConfig, LoadError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.to_owned(), err })?;
        let raw: RawJumpHostConfig = json5::from_str(&contents)
            .map_err(|err| LoadError::Parse { path: path.to_owned(), err })?;
        Ok(JumpHostConfig {
            host: raw.host,
            credentials: raw.credentials,
            ssh_port: raw.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
            config_path: reference,
        })
    }
}

fn parse_tags(
    path: &Utf8Path,
    raw: &[String],
) -> Result<BTreeSet<CapabilityTag>, LoadError> {
    raw.iter()
        .map(|tag| {
            tag.parse().map_err(|err| LoadError::UnknownTag {
                path: path.to_owned(),
                err,
            })
        })
        .collect()
}

fn resolve_relative(base: &Utf8Path, reference: &Utf8Path) -> Utf8PathBuf {
    if reference.is_absolute() {
        reference.to_owned()
    } else {
        base.parent().unwrap_or(Utf8Path::new(".")).join(reference)
    }
}

// Cycle detection must see through `a.json5` vs `./a.json5`; full
// filesystem canonicalisation would break on the not-yet-written configs
// the scanner seeds, so normalise lexically.
fn canonicalize_for_cycle_check(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            camino::Utf8Component::CurDir => {}
            camino::Utf8Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}
