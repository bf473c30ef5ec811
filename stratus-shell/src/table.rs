// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsers for the two ASCII table shapes the platform CLIs print.
//!
//! Every vendor-specific output object composes these; no other code
//! scrapes table text directly.
//!
//! Horizontal tables carry one header block and one row per entity:
//!
//! ```text
//! +----+--------------+
//! | id | hostname     |
//! +----+--------------+
//! | 1  | controller-0 |
//! +----+--------------+
//! ```
//!
//! Vertical tables carry `Property | Value` pairs for one entity, the
//! way `system host-show` and `system oam-show` do.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TableParseError {
    #[error("output does not contain a table: {0}")]
    NotATable(String),

    #[error(
        "expected {expected} columns based on the separator but found \
         {found} in line {line:?}"
    )]
    ColumnMismatch { expected: usize, found: usize, line: String },

    #[error("continuation line {line:?} with no row to continue")]
    BadContinuation { line: String },

    #[error("vertical table header must name Property and Value columns")]
    MissingHeader,
}

fn is_separator(line: &str) -> bool {
    line.contains("+--")
}

/// Parse a bordered multi-column table into one map per row, keyed by
/// header.  Multi-line headers and continuation rows (empty first
/// column) are folded into their owners.
pub fn parse_horizontal(
    lines: &[String],
) -> Result<Vec<BTreeMap<String, String>>, TableParseError> {
    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut columns = 0usize;

    let mut in_headers = false;
    let mut in_content = false;

    for line in lines {
        let trimmed = line.trim_end();
        if !(trimmed.starts_with('|') || is_separator(trimmed)) {
            // Shell noise around the table.
            continue;
        }

        if is_separator(trimmed) {
            if !in_headers && !in_content {
                in_headers = true;
                columns = trimmed.matches('+').count().saturating_sub(1);
                headers = vec![String::new(); columns];
            } else if in_headers {
                in_headers = false;
                in_content = true;
            } else {
                in_headers = false;
                in_content = false;
            }
            continue;
        }

        let cells = split_row(trimmed);
        if cells.len() != columns {
            return Err(TableParseError::ColumnMismatch {
                expected: columns,
                found: cells.len(),
                line: trimmed.to_string(),
            });
        }

        if in_headers {
            for (header, cell) in headers.iter_mut().zip(&cells) {
                header.push_str(cell);
            }
        } else if in_content {
            if !cells[0].is_empty() {
                rows.push(cells);
            } else {
                // Continuation of the previous row's long values.
                let previous = rows.last_mut().ok_or_else(|| {
                    TableParseError::BadContinuation {
                        line: trimmed.to_string(),
                    }
                })?;
                for (value, cell) in previous.iter_mut().zip(&cells) {
                    value.push_str(cell);
                }
            }
        }
    }

    if headers.is_empty() {
        return Err(TableParseError::NotATable(
            "no header separator found".to_string(),
        ));
    }

    Ok(rows
        .into_iter()
        .map(|row| headers.iter().cloned().zip(row).collect())
        .collect())
}

/// Parse a two-column `Property | Value` table into a map.  Multi-line
/// values are folded with a space; one trailing non-table message line
/// after the closing border is tolerated.
pub fn parse_vertical(
    lines: &[String],
) -> Result<BTreeMap<String, String>, TableParseError> {
    let table: Vec<&str> = lines
        .iter()
        .map(|line| line.trim_end())
        .filter(|line| line.starts_with('|') || is_separator(line))
        .collect();

    // Border, header, border, at least one data row, border.
    if table.len() < 5 {
        return Err(TableParseError::NotATable(format!(
            "expected at least 5 table rows, found {}",
            table.len()
        )));
    }
    if !is_separator(table[0])
        || !is_separator(table[2])
        || !is_separator(table[table.len() - 1])
    {
        return Err(TableParseError::NotATable(
            "missing table borders".to_string(),
        ));
    }
    if !(table[1].contains("Property") && table[1].contains("Value")) {
        return Err(TableParseError::MissingHeader);
    }

    let mut values = BTreeMap::new();
    let mut previous_key: Option<String> = None;
    for line in &table[3..table.len() - 1] {
        let cells = split_row(line);
        if cells.len() < 2 {
            return Err(TableParseError::ColumnMismatch {
                expected: 2,
                found: cells.len(),
                line: line.to_string(),
            });
        }
        let key = cells[0].clone();
        // Values may themselves contain '|'; glue any extra cells back.
        let value = cells[1..].join("|");

        if key.is_empty() {
            let previous = previous_key.as_ref().ok_or_else(|| {
                TableParseError::BadContinuation { line: line.to_string() }
            })?;
            let entry: &mut String = values
                .get_mut(previous)
                .expect("previous_key always present in map");
            entry.push(' ');
            entry.push_str(&value);
        } else {
            values.insert(key.clone(), value);
            previous_key = Some(key);
        }
    }

    Ok(values)
}

// "| a | b |" -> ["a", "b"], cells trimmed.
fn split_row(line: &str) -> Vec<String> {
    let inner = line
        .trim_end()
        .strip_prefix('|')
        .and_then(|rest| rest.strip_suffix('|'))
        .unwrap_or(line);
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_horizontal_simple() {
        let output = lines(
            "+----+--------------+-------------+\n\
             | id | hostname     | personality |\n\
             +----+--------------+-------------+\n\
             | 1  | controller-0 | controller  |\n\
             | 2  | compute-0    | worker      |\n\
             +----+--------------+-------------+",
        );
        let rows = parse_horizontal(&output).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["hostname"], "controller-0");
        assert_eq!(rows[1]["personality"], "worker");
    }

    #[test]
    fn test_parse_horizontal_multiline_headers_and_rows() {
        // Shape taken from `system ptp-instance-list`: a header wrapped
        // over two lines and values wrapped over continuation rows.
        let output = lines(
            "+--------------------------------------+---------+-----------+---------------+\n\
             | uuid                                 | name    | ptp_insta | parameters    |\n\
             |                                      |         | nce_name  |               |\n\
             +--------------------------------------+---------+-----------+---------------+\n\
             | 0000c96e-6dab-48c2-875a-48af194c893c | n4_p2   | ptp4      | ['masterOnly= |\n\
             |                                      |         |           | 1']           |\n\
             |                                      |         |           |               |\n\
             | 24003e49-f9c4-4794-970e-506fa5c215c0 | n1_if   | clock1    | []            |\n\
             +--------------------------------------+---------+-----------+---------------+",
        );
        let rows = parse_horizontal(&output).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ptp_instance_name"], "ptp4");
        assert_eq!(rows[0]["parameters"], "['masterOnly=1']");
        assert_eq!(rows[1]["name"], "n1_if");
    }

    #[test]
    fn test_parse_horizontal_skips_shell_noise() {
        let output = lines(
            "Last login: Mon Aug  4 12:00:01\n\
             +----+------+\n\
             | id | name |\n\
             +----+------+\n\
             | 1  | sc1  |\n\
             +----+------+\n\
             some trailing chatter",
        );
        let rows = parse_horizontal(&output).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "sc1");
    }

    #[test]
    fn test_parse_horizontal_column_mismatch() {
        let output = lines(
            "+----+------+\n\
             | id | name | extra |\n\
             +----+------+\n\
             +----+------+",
        );
        assert!(matches!(
            parse_horizontal(&output),
            Err(TableParseError::ColumnMismatch { expected: 2, .. })
        ));
    }

    #[test]
    fn test_parse_horizontal_no_table() {
        let output = lines("nothing to see here");
        assert!(matches!(
            parse_horizontal(&output),
            Err(TableParseError::NotATable(_))
        ));
    }

    #[test]
    fn test_parse_vertical_host_show() {
        let output = lines(
            "+------------------------+----------------------------------+\n\
             | Property               | Value                            |\n\
             +------------------------+----------------------------------+\n\
             | administrative         | unlocked                         |\n\
             | bm_type                | ipmi                             |\n\
             | capabilities           | {'stor_function': 'monitor',     |\n\
             |                        | 'Personality': 'Controller'}     |\n\
             | clock_synchronization  | ntp                              |\n\
             +------------------------+----------------------------------+",
        );
        let values = parse_vertical(&output).unwrap();
        assert_eq!(values["administrative"], "unlocked");
        assert_eq!(values["bm_type"], "ipmi");
        assert_eq!(
            values["capabilities"],
            "{'stor_function': 'monitor', 'Personality': 'Controller'}"
        );
    }

    #[test]
    fn test_parse_vertical_tolerates_trailing_message() {
        let output = lines(
            "+---------------+------------------+\n\
             | Property      | Value            |\n\
             +---------------+------------------+\n\
             | oam_ip        | 10.20.1.3        |\n\
             | oam_floating_ip | 10.20.1.2      |\n\
             +---------------+------------------+\n\
             Please use 'system oam-modify' to change these values.",
        );
        let values = parse_vertical(&output).unwrap();
        assert_eq!(values["oam_ip"], "10.20.1.3");
        assert_eq!(values["oam_floating_ip"], "10.20.1.2");
    }

    #[test]
    fn test_parse_vertical_requires_property_value_header() {
        let output = lines(
            "+----+------+\n\
             | id | name |\n\
             +----+------+\n\
             | 1  | x    |\n\
             +----+------+",
        );
        assert_eq!(
            parse_vertical(&output),
            Err(TableParseError::MissingHeader)
        );
    }

    #[test]
    fn test_parse_vertical_too_short() {
        let output = lines("+--+--+\n| Property | Value |\n+--+--+");
        assert!(matches!(
            parse_vertical(&output),
            Err(TableParseError::NotATable(_))
        ));
    }
}
