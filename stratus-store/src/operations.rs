// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Low-level helpers over tokio_postgres that keep the SQL text in the
//! error they produce.

use crate::error::StoreError;
use std::fmt;
use tokio_postgres::types::{FromSql, ToSql};

pub async fn sql_query(
    client: &tokio_postgres::Client,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<tokio_postgres::Row>, StoreError> {
    client
        .query(sql, params)
        .await
        .map_err(|source| StoreError::Sql { sql: sql.to_owned(), source })
}

/// Like [`sql_query()`], but produces an error unless exactly one row
/// is returned.
pub async fn sql_query_one(
    client: &tokio_postgres::Client,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<tokio_postgres::Row, StoreError> {
    sql_query(client, sql, params).await.and_then(|mut rows| {
        match rows.len() {
            1 => Ok(rows.pop().unwrap()),
            nrows_found => Err(StoreError::BadRowCount {
                sql: sql.to_owned(),
                nrows_found: nrows_found as u64,
            }),
        }
    })
}

pub async fn sql_execute(
    client: &tokio_postgres::Client,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<u64, StoreError> {
    client
        .execute(sql, params)
        .await
        .map_err(|source| StoreError::Sql { sql: sql.to_owned(), source })
}

/// Extract a named field from a row.
pub fn sql_row_value<'a, I, T>(
    row: &'a tokio_postgres::Row,
    idx: I,
) -> Result<T, StoreError>
where
    I: tokio_postgres::row::RowIndex + fmt::Display,
    T: FromSql<'a>,
{
    let column = idx.to_string();
    row.try_get(idx)
        .map_err(|source| StoreError::Deserialize { column, source })
}
