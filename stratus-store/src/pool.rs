// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Database connection pooling.

use crate::error::StoreError;
use bb8_postgres::PostgresConnectionManager;
use std::ops::{Deref, DerefMut};
use stratus_config::DatabaseConfig;

pub struct Pool {
    pool: bb8::Pool<PostgresConnectionManager<tokio_postgres::NoTls>>,
}

pub struct Conn<'a> {
    conn: bb8::PooledConnection<
        'a,
        PostgresConnectionManager<tokio_postgres::NoTls>,
    >,
}

impl<'a> Deref for Conn<'a> {
    type Target = tokio_postgres::Client;

    fn deref(&self) -> &Self::Target {
        self.conn.deref()
    }
}

impl<'a> DerefMut for Conn<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.deref_mut()
    }
}

impl Pool {
    /// Build the pool without connecting; connections are established
    /// lazily so an unreachable database surfaces per call, where the
    /// retry policy can deal with it.
    pub fn new(db_config: &DatabaseConfig) -> Self {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&db_config.host_name)
            .port(db_config.port)
            .dbname(&db_config.db_name)
            .user(&db_config.user_name)
            .password(&db_config.password);
        let mgr = PostgresConnectionManager::new(
            pg_config,
            tokio_postgres::NoTls,
        );
        let pool = bb8::Builder::new().build_unchecked(mgr);
        Pool { pool }
    }

    pub async fn acquire(&self) -> Result<Conn<'_>, StoreError> {
        self.pool.get().await.map(|conn| Conn { conn }).map_err(|e| {
            StoreError::Unavailable { message: e.to_string() }
        })
    }
}
