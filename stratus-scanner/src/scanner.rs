// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scan orchestration: one lab in, one [`LabView`] out, with the
//! updated config written back atomically and the tag rows replaced in
//! the store when one is configured.
//!
//! There is no process-global "current lab".  Every piece of state a
//! scan needs travels through explicit arguments; subcloud scans get
//! their own owned [`LabConfig`] and run as named tasks in parallel,
//! and aggregation into the central tag set happens here, on the
//! orchestrator task, after they have all joined.

use crate::error::ScanError;
use crate::inventory::{InventoryClient, SensorInfo, SystemInfo};
use crate::probes::{registry, ProbeCtx};
use named_task_set::NamedTaskSet;
use slog::{debug, info, warn, Logger};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use stratus_config::{write_lab_config, LabConfig, NodeConfig};
use stratus_rest::RestClient;
use stratus_shell::table::{parse_horizontal, parse_vertical};
use stratus_shell::{
    PromptResponse, ShellConnection, ShellPool, DEFAULT_SEND_TIMEOUT,
};
use stratus_store::DataStore;
use stratus_types::{
    derive_lab_type, Capability, CapabilityTag, LabType, LabView, NodeView,
};

const CLI_TIMEOUT: Duration = Duration::from_secs(60);
const SUBCLOUD_JOIN_TIMEOUT: Duration = Duration::from_secs(3600);

/// A finished scan: the view, and the updated config as written to
/// disk.
#[derive(Debug)]
pub struct ScanOutcome {
    pub view: LabView,
    pub config: LabConfig,
}

pub struct Scanner {
    log: Logger,
    store: Option<Arc<DataStore>>,
}

impl Scanner {
    pub fn new(log: &Logger, store: Option<Arc<DataStore>>) -> Scanner {
        Scanner {
            log: log.new(slog::o!("component" => "scanner")),
            store,
        }
    }

    /// Scan `lab`, rewrite its config file (and its subclouds'), and
    /// replace its capability rows in the store.
    pub async fn scan(&self, lab: &LabConfig) -> Result<ScanOutcome, ScanError> {
        info!(self.log, "scanning lab"; "lab" => &lab.lab_name);
        let mut pool = ShellPool::new(&self.log);
        let result = self.scan_with_pool(&mut pool, lab).await;
        pool.remove_all().await;
        result
    }

    async fn scan_with_pool(
        &self,
        pool: &mut ShellPool,
        lab: &LabConfig,
    ) -> Result<ScanOutcome, ScanError> {
        let shell = pool
            .get_or_open(
                Some("active-controller"),
                &lab.floating_ip,
                &lab.admin_credentials.user_name,
                &lab.admin_credentials.password,
                lab.ssh_port,
                lab.jump_host.clone(),
            )
            .await?;
        let rest =
            RestClient::new(&self.log, &lab.floating_ip, &lab.rest_credentials)?;

        let (system, mut view) =
            scan_cloud_hosts(&self.log, lab, shell, &rest).await?;

        // A central cloud also owns every managed+online subcloud.
        let mut subcloud_configs = Vec::new();
        if system.is_system_controller() {
            let targets = self.discover_subclouds(shell, lab).await?;
            let (views, configs) = self.scan_subclouds(targets).await?;
            for subcloud_view in &views {
                import_subcloud_tags(&mut view.tags, subcloud_view);
            }
            if !views.is_empty() {
                view.tags
                    .insert(CapabilityTag::Base(Capability::LabHasSubcloud));
            }
            if views.len() >= 2 {
                view.tags.insert(CapabilityTag::Base(
                    Capability::LabHasMin2Subclouds,
                ));
            }
            view.subclouds = views;
            subcloud_configs = configs;
        }

        let mut config = lab.clone();
        apply_scan(&mut config, &view, system.capabilities.https_enabled);
        if !subcloud_configs.is_empty() {
            config.is_dc = true;
            config.subclouds = subcloud_configs;
        }
        write_lab_config(&config)?;

        self.persist_tags(&config.lab_name, &view.tags).await;

        info!(
            self.log,
            "scan complete";
            "lab" => &config.lab_name,
            "lab_type" => %view.lab_type,
            "tags" => view.tags.len(),
        );
        Ok(ScanOutcome { view, config })
    }

    /// Scan each subcloud in parallel, one named task per subcloud.
    /// Returns views and updated configs, both sorted by subcloud name.
    async fn scan_subclouds(
        &self,
        targets: Vec<LabConfig>,
    ) -> Result<(Vec<LabView>, Vec<LabConfig>), ScanError> {
        if targets.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut tasks: NamedTaskSet<ScanOutcome> = NamedTaskSet::new();
        let mut names = Vec::new();
        for subcloud in targets {
            let name = subcloud.lab_name.clone();
            names.push(name.clone());
            let log = self.log.clone();
            let stop = tasks.stop_token();
            tasks.spawn(&name.clone(), async move {
                if stop.is_stopped() {
                    anyhow::bail!("stopped before scanning {}", name);
                }
                let outcome = scan_subcloud(&log, subcloud).await?;
                Ok(outcome)
            });
        }
        tasks
            .join_all(SUBCLOUD_JOIN_TIMEOUT)
            .await
            .map_err(ScanError::Subclouds)?;

        names.sort_unstable();
        let mut results = tasks.into_results();
        let mut views = Vec::with_capacity(names.len());
        let mut configs = Vec::with_capacity(names.len());
        for name in names {
            let outcome = results
                .remove(&name)
                .expect("every joined task has a result");
            views.push(outcome.view);
            configs.push(outcome.config);
        }
        Ok((views, configs))
    }

    /// List subclouds on the central shell and keep the healthy ones,
    /// seeding config files for subclouds seen for the first time and
    /// resolving each subcloud's external management IP.  Subclouds
    /// whose IP cannot be resolved are skipped with a warning.
    async fn discover_subclouds(
        &self,
        shell: &mut ShellConnection,
        lab: &LabConfig,
    ) -> Result<Vec<LabConfig>, ScanError> {
        let lines = shell
            .send(
                "source /etc/platform/openrc; dcmanager subcloud list",
                CLI_TIMEOUT,
            )
            .await?;
        let rows = parse_horizontal(&lines)?;
        let names = healthy_subcloud_names(&self.log, &rows);

        let config_dir = lab
            .config_path
            .parent()
            .unwrap_or(camino::Utf8Path::new("."))
            .to_owned();

        let mut subclouds = Vec::new();
        for name in names {
            let path = config_dir.join(format!("{}.json5", name));
            let mut subcloud = if path.exists() {
                LabConfig::from_file(&path)?
            } else {
                let seeded = lab.seeded_subcloud(&name, path);
                write_lab_config(&seeded)?;
                seeded
            };

            match self.resolve_subcloud_ip(shell, &name, lab).await {
                Some(ip) => subcloud.floating_ip = ip,
                None => {
                    warn!(
                        self.log,
                        "no accessible IP for subcloud; skipping";
                        "subcloud" => &name,
                    );
                    continue;
                }
            }
            subcloud.system_controller_ip = Some(lab.floating_ip.clone());
            subcloud.system_controller_name = Some(lab.lab_name.clone());
            subclouds.push(subcloud);
        }
        Ok(subclouds)
    }

    // Resolve a subcloud's external management IP by running
    // `system oam-show` on it through a nested ssh from the central
    // cloud.  Any failure here skips the subcloud, never the scan.
    async fn resolve_subcloud_ip(
        &self,
        shell: &mut ShellConnection,
        subcloud_name: &str,
        lab: &LabConfig,
    ) -> Option<String> {
        let cmd = format!(
            "ssh {} -o UserKnownHostsFile=/dev/null \
             -o StrictHostKeyChecking=no",
            subcloud_name
        );
        let prompts = [
            PromptResponse::with_response(
                "password:",
                &lab.admin_credentials.password,
            ),
            PromptResponse::with_response(
                "~$",
                "source /etc/platform/openrc",
            ),
            PromptResponse::with_response("]$", "system oam-show"),
            PromptResponse::expect("@"),
        ];

        let lines = match shell.send_expect(&cmd, &prompts, CLI_TIMEOUT).await
        {
            Ok(lines) => lines,
            Err(error) => {
                warn!(
                    self.log,
                    "nested ssh to subcloud failed";
                    "subcloud" => subcloud_name,
                    "error" => %error,
                );
                // The nested shell is in an unknown state; start over.
                shell.close().await;
                return None;
            }
        };

        let ip = match parse_vertical(&lines) {
            Ok(values) => oam_ip(&values),
            Err(error) => {
                warn!(
                    self.log,
                    "could not parse oam-show output";
                    "subcloud" => subcloud_name,
                    "error" => %error,
                );
                None
            }
        };

        // Leave the nested session either way.
        if shell.send("exit", DEFAULT_SEND_TIMEOUT).await.is_err() {
            shell.close().await;
        }
        ip
    }

    async fn persist_tags(
        &self,
        lab_name: &str,
        tags: &BTreeSet<CapabilityTag>,
    ) {
        let Some(store) = self.store.as_deref() else {
            return;
        };
        store
            .write_with_retry("replace lab capabilities", move || async move {
                let lab_id = store.ensure_lab(lab_name).await?;
                store.replace_lab_capabilities(lab_id, tags).await
            })
            .await;
    }
}

/// One subcloud, in its own task: probe its hosts, reject central-cloud
/// pretenders, rewrite its config.
async fn scan_subcloud(
    log: &Logger,
    lab: LabConfig,
) -> Result<ScanOutcome, ScanError> {
    info!(log, "scanning subcloud"; "subcloud" => &lab.lab_name);
    let mut pool = ShellPool::new(log);
    let result = async {
        let shell = pool
            .get_or_open(
                Some("active-controller"),
                &lab.floating_ip,
                &lab.admin_credentials.user_name,
                &lab.admin_credentials.password,
                lab.ssh_port,
                lab.jump_host.clone(),
            )
            .await?;
        let rest =
            RestClient::new(log, &lab.floating_ip, &lab.rest_credentials)?;
        let (system, view) = scan_cloud_hosts(log, &lab, shell, &rest).await?;
        if system.is_system_controller() {
            return Err(ScanError::TopologyTooDeep {
                lab: lab.lab_name.clone(),
            });
        }
        let mut config = lab.clone();
        apply_scan(&mut config, &view, system.capabilities.https_enabled);
        write_lab_config(&config)?;
        Ok(ScanOutcome { view, config })
    }
    .await;
    pool.remove_all().await;
    result
}

/// Enumerate hosts and run the probe registry over each, folding node
/// tags into the lab tag set.  Probe output within a node is
/// sequential and nodes are visited in name order, so the resulting
/// sets are stable.
async fn scan_cloud_hosts(
    log: &Logger,
    lab: &LabConfig,
    shell: &mut ShellConnection,
    rest: &RestClient,
) -> Result<(SystemInfo, LabView), ScanError> {
    let inventory_client = InventoryClient::new(rest);
    let system = inventory_client.system_info().await?;
    let hosts = inventory_client.hosts().await?;
    let sensors = gather_sensor_info(log, shell).await;

    let mut view = LabView {
        lab_name: lab.lab_name.clone(),
        lab_type: LabType::Simplex,
        tags: BTreeSet::new(),
        nodes: Vec::new(),
        subclouds: Vec::new(),
    };

    for host in &hosts {
        let inventory = inventory_client.host_inventory(&host.uuid).await?;
        let mut node_tags = BTreeSet::new();
        {
            let ctx = ProbeCtx {
                lab,
                view: &view,
                hosts: &hosts,
                host,
                inventory: &inventory,
                sensors: &sensors,
            };
            for probe in registry() {
                let tags = probe.run(&ctx)?;
                debug!(
                    log,
                    "probe finished";
                    "probe" => probe.name,
                    "host" => &host.hostname,
                    "tags" => tags.len(),
                );
                node_tags.extend(tags);
            }
        }
        view.tags.extend(node_tags.iter().copied());
        view.nodes.push(NodeView {
            name: host.hostname.clone(),
            ip: host.mgmt_ip.clone(),
            role: host.personality,
            sub_functions: host.subfunctions.clone(),
            bm_type: host.bm_type.clone(),
            bm_ip: host.bm_ip.clone(),
            bm_username: host.bm_username.clone(),
            tags: node_tags,
        });
    }

    view.lab_type = derive_lab_type(&view.nodes);
    Ok((system, view))
}

// `lab_bmc_sensor` input: row count of `ipmitool sensor list` on the
// active controller.  A missing tool or a failing command is silently
// zero rows.
async fn gather_sensor_info(
    log: &Logger,
    shell: &mut ShellConnection,
) -> SensorInfo {
    let which = match shell
        .send("command -v ipmitool", DEFAULT_SEND_TIMEOUT)
        .await
    {
        Ok(lines) => lines,
        Err(error) => {
            debug!(log, "ipmitool lookup failed"; "error" => %error);
            return SensorInfo::default();
        }
    };
    if !which.iter().any(|line| line.contains("ipmitool")) {
        return SensorInfo::default();
    }

    match shell.send_as_sudo("ipmitool sensor list", CLI_TIMEOUT).await {
        Ok(lines) => SensorInfo {
            sensor_rows: lines
                .iter()
                .filter(|line| line.contains('|'))
                .count(),
        },
        Err(error) => {
            debug!(log, "ipmitool sensor list failed"; "error" => %error);
            SensorInfo::default()
        }
    }
}

/// Names of subclouds that are both managed and online, in listing
/// order.
fn healthy_subcloud_names(
    log: &Logger,
    rows: &[BTreeMap<String, String>],
) -> Vec<String> {
    let mut names = Vec::new();
    for row in rows {
        let Some(name) = row.get("name") else {
            continue;
        };
        let managed = row.get("management").map(String::as_str)
            == Some("managed");
        let online = row.get("availability").map(String::as_str)
            == Some("online");
        if managed && online {
            names.push(name.clone());
        } else {
            info!(
                log,
                "subcloud is not managed and online; it will not be scanned";
                "subcloud" => name,
            );
        }
    }
    names
}

// oam_ip serves virtualised labs; physical labs report the floating IP.
fn oam_ip(values: &BTreeMap<String, String>) -> Option<String> {
    values
        .get("oam_ip")
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            values.get("oam_floating_ip").filter(|ip| !ip.is_empty())
        })
        .cloned()
}

/// Import every base tag of a subcloud into the central tag set under
/// the `subcloud_` prefix.
fn import_subcloud_tags(
    central: &mut BTreeSet<CapabilityTag>,
    subcloud: &LabView,
) {
    for tag in &subcloud.tags {
        if let Some(inherited) = tag.inherited() {
            central.insert(inherited);
        }
    }
}

/// Fold a finished view back into the config that will be written to
/// disk.
fn apply_scan(config: &mut LabConfig, view: &LabView, https_enabled: bool) {
    config.lab_type = view.lab_type.to_string();
    config.lab_capabilities = view.tags.clone();
    config.nodes = view.nodes.iter().map(node_config_from_view).collect();
    config.horizon_url =
        Some(horizon_url(https_enabled, &config.floating_ip));
}

fn node_config_from_view(node: &NodeView) -> NodeConfig {
    NodeConfig {
        name: node.name.clone(),
        ip: node.ip.clone().unwrap_or_default(),
        role: node.role,
        capabilities: node.tags.clone(),
        sub_functions: node.sub_functions.clone(),
        bm_ip: node.bm_ip.clone(),
        bm_username: node.bm_username.clone(),
    }
}

fn horizon_url(https_enabled: bool, floating_ip: &str) -> String {
    let (protocol, port) =
        if https_enabled { ("https", 8443) } else { ("http", 8080) };
    let host = if floating_ip.contains(':') {
        format!("[{}]", floating_ip)
    } else {
        floating_ip.to_string()
    };
    format!("{}://{}:{}/", protocol, host, port)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use stratus_types::NodeRole;

    fn discard_log() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    #[test]
    fn test_horizon_url() {
        assert_eq!(horizon_url(false, "10.0.0.1"), "http://10.0.0.1:8080/");
        assert_eq!(horizon_url(true, "10.0.0.1"), "https://10.0.0.1:8443/");
        assert_eq!(
            horizon_url(true, "fdff:10:80:221::2"),
            "https://[fdff:10:80:221::2]:8443/"
        );
    }

    #[test]
    fn test_healthy_subcloud_filter_from_cli_table() {
        let output: Vec<String> =
            "+-----------+------------+--------------+\n\
             | name      | management | availability |\n\
             +-----------+------------+--------------+\n\
             | subcloud1 | managed    | online       |\n\
             | subcloud2 | unmanaged  | online       |\n\
             | subcloud3 | managed    | offline      |\n\
             +-----------+------------+--------------+"
                .lines()
                .map(str::to_string)
                .collect();
        let rows = parse_horizontal(&output).unwrap();
        let names = healthy_subcloud_names(&discard_log(), &rows);
        assert_eq!(names, vec!["subcloud1"]);
    }

    #[test]
    fn test_oam_ip_prefers_oam_ip_then_floating() {
        let mut values = BTreeMap::new();
        values.insert("oam_floating_ip".to_string(), "10.20.1.2".to_string());
        assert_eq!(oam_ip(&values).as_deref(), Some("10.20.1.2"));

        values.insert("oam_ip".to_string(), "10.20.1.3".to_string());
        assert_eq!(oam_ip(&values).as_deref(), Some("10.20.1.3"));

        values.insert("oam_ip".to_string(), String::new());
        assert_eq!(oam_ip(&values).as_deref(), Some("10.20.1.2"));
    }

    #[test]
    fn test_import_subcloud_tags_prefixes_everything() {
        let subcloud = LabView {
            lab_name: "subcloud1".to_string(),
            lab_type: LabType::Simplex,
            tags: BTreeSet::from([
                CapabilityTag::Base(Capability::LabIsSimplex),
                CapabilityTag::Base(Capability::LabHasSriov),
            ]),
            nodes: Vec::new(),
            subclouds: Vec::new(),
        };
        let mut central =
            BTreeSet::from([CapabilityTag::Base(Capability::LabIsIpv4)]);
        import_subcloud_tags(&mut central, &subcloud);

        for tag in &subcloud.tags {
            assert!(central.contains(&tag.inherited().unwrap()));
        }
        assert!(central.contains(&CapabilityTag::Base(Capability::LabIsIpv4)));
    }

    #[test]
    fn test_node_config_from_view() {
        let node = NodeView {
            name: "controller-0".to_string(),
            ip: Some("192.168.204.2".to_string()),
            role: NodeRole::Controller,
            sub_functions: vec!["controller".to_string()],
            bm_type: Some("ipmi".to_string()),
            bm_ip: Some("10.0.1.2".to_string()),
            bm_username: Some("root".to_string()),
            tags: BTreeSet::from([CapabilityTag::Base(
                Capability::LabIsSimplex,
            )]),
        };
        let config = node_config_from_view(&node);
        assert_eq!(config.name, "controller-0");
        assert_eq!(config.ip, "192.168.204.2");
        assert_eq!(config.role, NodeRole::Controller);
        assert_eq!(config.capabilities, node.tags);
    }
}
