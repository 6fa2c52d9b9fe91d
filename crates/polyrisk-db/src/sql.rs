//! SQL text helpers shared by query builders and backends.

use crate::error::{DbError, Result};

/// Table and column names come from configuration and are spliced into SQL
/// text, so only plain (optionally schema-qualified) identifiers are allowed.
pub fn validate_identifier(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if ok {
        Ok(())
    } else {
        Err(DbError::InvalidQuery(format!("invalid identifier: {name:?}")))
    }
}

/// Rewrite portable `?` placeholders to Postgres `$1, $2, ...`.
/// Question marks inside single-quoted literals or double-quoted identifiers
/// are left alone.
pub fn rewrite_placeholders(sql: &str) -> String {
    scan_placeholders(sql).0
}

pub fn count_placeholders(sql: &str) -> usize {
    scan_placeholders(sql).1
}

fn scan_placeholders(sql: &str) -> (String, usize) {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut n = 0usize;
    let mut in_single = false;
    let mut in_double = false;

    for c in sql.chars() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                out.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                out.push(c);
            }
            '?' if !in_single && !in_double => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(c),
        }
    }
    (out, n)
}

/// `(a = ? AND b = ?) OR (a = ? AND b = ?) ...`, one group per key.
pub fn or_of_and_clauses(columns: &[&str], groups: usize) -> String {
    let clause = format!(
        "({})",
        columns
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(" AND ")
    );
    vec![clause; groups].join(" OR ")
}

/// `?, ?, ?` for an `IN (...)` list of `n` values.
pub fn placeholder_list(n: usize) -> String {
    vec!["?"; n].join(", ")
}
