//! Large-payload offload interfaces (C3 Shared Memory Store, C4 SQL Result
//! Store) and the helpers the executor uses to decide when to offload.
//!
//! Concrete implementations live in the `shuttle-store` crate; this module
//! defines the traits and the pure functions so the executor can depend on
//! the contract without depending on SQLite or the LRU cache crate.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::model::{DataMetadata, DataReference};

#[async_trait]
pub trait SharedMemoryStore: Send + Sync {
    async fn store(
        &self,
        id: &str,
        bytes: Vec<u8>,
        media_type: &str,
        tags: &[String],
    ) -> Result<DataReference, Error>;

    async fn get(&self, reference: &DataReference) -> Result<Vec<u8>, Error>;

    async fn get_metadata(&self, reference: &DataReference) -> Result<DataMetadata, Error>;

    async fn stats(&self) -> Result<StoreStats, Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub item_count: usize,
    pub bytes: usize,
}

/// Tabular tool output: `{columns: [string], rows: [[any]]}`.
#[derive(Debug, Clone, Default)]
pub struct TabularData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Default)]
pub struct TableMetadata {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
}

#[async_trait]
pub trait SqlResultStore: Send + Sync {
    async fn store(&self, id: &str, data: TabularData) -> Result<DataReference, Error>;

    /// Evaluates a SQL SELECT against the per-reference table (conventionally
    /// named `results`).
    async fn query(&self, reference: &str, sql: &str) -> Result<TabularData, Error>;

    async fn get_metadata(&self, reference: &str) -> Result<TableMetadata, Error>;
}

/// Tool names that return already-stored large data; wrapping their output
/// in another offload would recurse on the store's own retrieval tools.
/// Any new tool whose contract is "return already-stored large data" MUST
/// be added here.
pub const RESULT_OFFLOAD_EXEMPT: &[&str] = &["get_tool_result", "query_tool_result"];

pub fn is_result_offload_exempt(tool_name: &str) -> bool {
    RESULT_OFFLOAD_EXEMPT.contains(&tool_name)
}

/// True iff `value` is a mapping containing both a `rows`/`Rows` key and a
/// `columns`/`Columns` key.
pub fn is_sql_result(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let has_rows = obj.contains_key("rows") || obj.contains_key("Rows");
    let has_columns = obj.contains_key("columns") || obj.contains_key("Columns");
    has_rows && has_columns
}

/// Parses a `Value` already known to satisfy [`is_sql_result`] into
/// [`TabularData`]. Missing or malformed `rows`/`columns` degrade to empty
/// rather than erroring, since this is only ever called after the shape
/// check above has already passed.
pub fn parse_tabular(value: &Value) -> TabularData {
    let obj = value.as_object();
    let columns = obj
        .and_then(|o| o.get("columns").or_else(|| o.get("Columns")))
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let rows = obj
        .and_then(|o| o.get("rows").or_else(|| o.get("Rows")))
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|row| row.as_array().cloned())
                .collect()
        })
        .unwrap_or_default();
    TabularData { columns, rows }
}

/// Size estimate used to decide whether a value is large enough to
/// offload. Strings and byte-like values use their length; mappings and
/// sequences use their JSON-serialized length; numeric and boolean
/// primitives always return 0 and are therefore never offloaded on their
/// own, even when individually huge — intentional per the offload
/// semantics, not a bug to "fix".
pub fn estimate_value_size(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        Value::Array(_) | Value::Object(_) => serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0),
        Value::Number(_) | Value::Bool(_) | Value::Null => 0,
    }
}

/// Converts camelCase/PascalCase/mixed identifiers to snake_case by
/// lowercasing and inserting `_` before each uppercase rune other than the
/// first character.
pub fn to_lower_underscore(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(ch.to_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_lower_underscore_handles_camel_and_pascal() {
        assert_eq!(to_lower_underscore("userId"), "user_id");
        assert_eq!(to_lower_underscore("ErrorId"), "error_id");
        assert_eq!(to_lower_underscore("already_snake"), "already_snake");
        assert_eq!(to_lower_underscore("HTTPRequest"), "h_t_t_p_request");
    }

    #[test]
    fn estimate_size_never_offloads_bare_primitives() {
        assert_eq!(estimate_value_size(&json!(9_999_999_999_i64)), 0);
        assert_eq!(estimate_value_size(&json!(true)), 0);
        assert_eq!(estimate_value_size(&json!(null)), 0);
    }

    #[test]
    fn estimate_size_counts_string_length() {
        let s = "x".repeat(3000);
        assert_eq!(estimate_value_size(&json!(s)), 3000);
    }

    #[test]
    fn is_sql_result_requires_both_keys() {
        assert!(is_sql_result(&json!({"columns": ["a"], "rows": [[1]]})));
        assert!(is_sql_result(&json!({"Columns": ["a"], "Rows": [[1]]})));
        assert!(!is_sql_result(&json!({"columns": ["a"]})));
        assert!(!is_sql_result(&json!("not an object")));
    }

    #[test]
    fn exempt_tools_are_not_offload_candidates() {
        assert!(is_result_offload_exempt("get_tool_result"));
        assert!(is_result_offload_exempt("query_tool_result"));
        assert!(!is_result_offload_exempt("http_request"));
    }
}
