// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection pool for interactive shells.
//!
//! Entries are keyed by `(host, user, name)` and owned by the component
//! that created the pool; pools are not shared across tasks.  Asking for
//! a name that is already bound to a different host or user yields a
//! fresh entry under `<name>_<timestamp>`.

use crate::connection::ShellConnection;
use crate::error::ShellError;
use slog::{debug, Logger};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use stratus_config::JumpHostConfig;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct PoolKey {
    host: String,
    user: String,
    name: String,
}

pub struct ShellPool {
    log: Logger,
    connections: HashMap<PoolKey, ShellConnection>,
}

impl ShellPool {
    pub fn new(log: &Logger) -> ShellPool {
        ShellPool {
            log: log.new(slog::o!("component" => "shell-pool")),
            connections: HashMap::new(),
        }
    }

    /// Get the connection for `(host, user, name)`, opening (and
    /// connecting) it on first use.  `name` defaults to the host.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_or_open(
        &mut self,
        name: Option<&str>,
        host: &str,
        user: &str,
        password: &str,
        ssh_port: u16,
        jump_host: Option<JumpHostConfig>,
    ) -> Result<&mut ShellConnection, ShellError> {
        let requested = name.unwrap_or(host).to_string();
        let key = PoolKey {
            host: host.to_string(),
            user: user.to_string(),
            name: self.resolve_name(&requested, host, user),
        };

        if !self.connections.contains_key(&key) {
            debug!(self.log, "opening shell";
                "name" => &key.name, "host" => host, "user" => user);
            let mut connection = ShellConnection::new(
                &self.log,
                &key.name,
                host,
                user,
                password,
                ssh_port,
                jump_host,
            );
            connection.connect().await?;
            self.connections.insert(key.clone(), connection);
        }
        Ok(self.connections.get_mut(&key).expect("inserted above"))
    }

    /// Look up an existing connection by name.
    pub fn get(&mut self, name: &str) -> Option<&mut ShellConnection> {
        self.connections
            .values_mut()
            .find(|connection| connection.name == name)
    }

    /// Close every connection and empty the pool.
    pub async fn remove_all(&mut self) {
        for (_, mut connection) in self.connections.drain() {
            connection.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    // A name already bound to a different (host, user) gets a monotonic
    // timestamp suffix rather than stealing the entry.
    fn resolve_name(&self, requested: &str, host: &str, user: &str) -> String {
        let taken = self.connections.keys().any(|key| {
            key.name == requested && (key.host != host || key.user != user)
        });
        if !taken {
            return requested.to_string();
        }
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before 1970")
            .as_millis();
        format!("{}_{}", requested, timestamp)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pool() -> ShellPool {
        ShellPool::new(&Logger::root(slog::Discard, slog::o!()))
    }

    #[test]
    fn test_resolve_name_prefers_requested() {
        let pool = pool();
        assert_eq!(
            pool.resolve_name("controller", "10.0.0.1", "sysadmin"),
            "controller"
        );
    }

    #[test]
    fn test_resolve_name_suffixes_on_collision() {
        let mut pool = pool();
        pool.connections.insert(
            PoolKey {
                host: "10.0.0.1".to_string(),
                user: "sysadmin".to_string(),
                name: "controller".to_string(),
            },
            ShellConnection::new(
                &pool.log,
                "controller",
                "10.0.0.1",
                "sysadmin",
                "pw",
                22,
                None,
            ),
        );
        // Same key: no suffix, the entry is reused.
        assert_eq!(
            pool.resolve_name("controller", "10.0.0.1", "sysadmin"),
            "controller"
        );
        // Same name, different host: suffixed.
        let renamed = pool.resolve_name("controller", "10.0.0.2", "sysadmin");
        assert!(renamed.starts_with("controller_"));
        assert_ne!(renamed, "controller");
    }
}
