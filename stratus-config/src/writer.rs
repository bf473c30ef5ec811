// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deterministic rewrite of a scanned lab config.
//!
//! The serialised form is stable: fixed key order, tags in registry
//! order, nodes and subclouds sorted by name.  Scanning an unchanged lab
//! twice therefore produces byte-identical files.  The write is atomic:
//! the new contents land in a temp file, the previous config is kept as
//! `<file>.bak`, and a rename publishes the result.

use crate::error::LoadError;
use crate::lab::{LabConfig, NodeConfig};
use camino::Utf8Path;
use serde_json::{json, Map, Value};

/// Serialise `config` and atomically replace its backing file.
pub fn write_lab_config(config: &LabConfig) -> Result<(), LoadError> {
    let path = &config.config_path;
    let contents = render(config);

    let tmp_path = sibling(path, "tmp");
    std::fs::write(&tmp_path, contents)
        .map_err(|err| LoadError::Io { path: tmp_path.clone(), err })?;

    if path.exists() {
        let bak_path = sibling(path, "bak");
        std::fs::rename(path, &bak_path)
            .map_err(|err| LoadError::Io { path: bak_path, err })?;
    }
    std::fs::rename(&tmp_path, path)
        .map_err(|err| LoadError::Io { path: path.clone(), err })
}

fn sibling(path: &Utf8Path, suffix: &str) -> camino::Utf8PathBuf {
    camino::Utf8PathBuf::from(format!("{}.{}", path, suffix))
}

fn render(config: &LabConfig) -> String {
    let mut root = Map::new();
    root.insert("floating_ip".into(), json!(config.floating_ip));
    root.insert("lab_name".into(), json!(config.lab_name));
    root.insert("lab_type".into(), json!(config.lab_type));
    root.insert(
        "admin_credentials".into(),
        json!({
            "user_name": config.admin_credentials.user_name,
            "password": config.admin_credentials.password,
        }),
    );
    root.insert("bm_password".into(), json!(config.bm_password));
    root.insert("use_jump_server".into(), json!(config.use_jump_server));
    if let Some(jump) = &config.jump_host {
        root.insert(
            "jump_server_config".into(),
            json!(jump.config_path.as_str()),
        );
    }
    root.insert("ssh_port".into(), json!(config.ssh_port));
    if let Some(url) = &config.horizon_url {
        root.insert("horizon_url".into(), json!(url));
    }
    if config.is_dc {
        root.insert("is_dc".into(), json!(true));
    }
    if let Some(ip) = &config.system_controller_ip {
        root.insert("system_controller_ip".into(), json!(ip));
    }
    if let Some(name) = &config.system_controller_name {
        root.insert("system_controller_name".into(), json!(name));
    }
    if let Some(path) = &config.secondary_system_controller {
        root.insert(
            "secondary_system_controller".into(),
            json!(path.as_str()),
        );
    }
    root.insert(
        "lab_capabilities".into(),
        Value::Array(
            // BTreeSet iteration: registry order, base before inherited.
            config
                .lab_capabilities
                .iter()
                .map(|tag| json!(tag.to_string()))
                .collect(),
        ),
    );

    if !config.nodes.is_empty() {
        let mut sorted: Vec<&NodeConfig> = config.nodes.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let mut nodes = Map::new();
        for node in sorted {
            let mut entry = Map::new();
            entry.insert("ip".into(), json!(node.ip));
            entry.insert("node_type".into(), json!(node.role.to_string()));
            if let Some(bm_ip) = &node.bm_ip {
                entry.insert("bm_ip".into(), json!(bm_ip));
            }
            if let Some(bm_username) = &node.bm_username {
                entry.insert("bm_username".into(), json!(bm_username));
            }
            if !node.sub_functions.is_empty() {
                entry.insert(
                    "sub_functions".into(),
                    json!(node.sub_functions),
                );
            }
            entry.insert(
                "node_capabilities".into(),
                Value::Array(
                    node.capabilities
                        .iter()
                        .map(|tag| json!(tag.to_string()))
                        .collect(),
                ),
            );
            nodes.insert(node.name.clone(), Value::Object(entry));
        }
        root.insert("nodes".into(), Value::Object(nodes));
    }

    if !config.subclouds.is_empty() {
        let mut sorted: Vec<&LabConfig> = config.subclouds.iter().collect();
        sorted.sort_by(|a, b| a.lab_name.cmp(&b.lab_name));
        let mut subclouds = Map::new();
        for subcloud in sorted {
            subclouds.insert(
                subcloud.lab_name.clone(),
                json!(subcloud.config_path.as_str()),
            );
        }
        root.insert("subclouds".into(), Value::Object(subclouds));
    }

    let mut out = serde_json::to_string_pretty(&Value::Object(root))
        .expect("lab config is always serialisable");
    out.push('\n');
    out
}
