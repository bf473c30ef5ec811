// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Database configuration.  The store is advisory: when `use_database`
//! is off, scans and runs proceed without it.

use crate::error::LoadError;
use camino::Utf8Path;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub use_database: bool,
    #[serde(default = "default_host")]
    pub host_name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub db_name: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "stratus".to_string()
}

impl DatabaseConfig {
    pub fn from_file(path: &Utf8Path) -> Result<DatabaseConfig, LoadError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.to_owned(), err })?;
        json5::from_str(&contents)
            .map_err(|err| LoadError::Parse { path: path.to_owned(), err })
    }

    /// No database: the built-in default when no config file is given.
    pub fn disabled() -> DatabaseConfig {
        DatabaseConfig {
            use_database: false,
            host_name: default_host(),
            port: default_port(),
            db_name: default_db_name(),
            user_name: String::new(),
            password: String::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn test_load_database_config() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("database.json5");
        std::fs::write(
            &path,
            r#"{
                use_database: true,
                host_name: "db.lab.example.com",
                port: 5432,
                db_name: "results",
                user_name: "harness",
                password: "hunter2",
            }"#,
        )
        .unwrap();
        let config = DatabaseConfig::from_file(&path).unwrap();
        assert!(config.use_database);
        assert_eq!(config.host_name, "db.lab.example.com");
        assert_eq!(config.db_name, "results");
    }

    #[test]
    fn test_disabled_default() {
        assert!(!DatabaseConfig::disabled().use_database);
    }
}
