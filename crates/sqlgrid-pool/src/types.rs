//! Value objects returned by pool and connection operations.
//!
//! These types are serialized verbatim into protocol responses, so field
//! names are part of the wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a SQL query: column names, column type names (same length and
/// order as `columns`), and eagerly materialized rows. Every row holds
/// exactly `columns.len()` values, in column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub column_types: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Result of a non-query SQL statement (INSERT, UPDATE, DELETE, DDL).
///
/// `rows_affected` and `last_insert_id` are each `-1` when the backend
/// cannot report them; the sentinel is the only way to distinguish
/// "unsupported" from a true zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatementResult {
    pub rows_affected: i64,
    pub last_insert_id: i64,
}

/// Read-only snapshot of a connection's display metadata. Never carries the
/// live handle or credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionInfo {
    pub id: String,
    pub driver: String,
    pub host: String,
    pub database: String,
    pub created: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_result_serializes_with_wire_field_names() {
        let result = QueryResult {
            columns: vec!["x".to_string()],
            column_types: vec!["INT".to_string()],
            rows: vec![vec![serde_json::json!(1)]],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["columns"][0], "x");
        assert_eq!(json["column_types"][0], "INT");
        assert_eq!(json["rows"][0][0], 1);
    }

    #[test]
    fn statement_result_round_trips_sentinels() {
        let result = StatementResult {
            rows_affected: -1,
            last_insert_id: 42,
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: StatementResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
