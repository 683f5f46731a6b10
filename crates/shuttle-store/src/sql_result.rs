//! SQLite-backed SQL Result Store (C4): each stored tabular result gets its
//! own `results` table in a per-reference, in-memory SQLite database kept
//! alive for the process lifetime, so a later `query_tool_result` can page
//! through a million-row result set with a real SQL engine instead of
//! rehydrating the whole thing.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{types::Value as SqlValue, Connection};
use serde_json::Value;
use shuttle_core::error::Error;
use shuttle_core::model::DataReference;
use shuttle_core::offload::{SqlResultStore, TabularData, TableMetadata};

pub struct SqliteResultStore {
    tables: Mutex<HashMap<String, (Connection, Vec<String>)>>,
}

impl SqliteResultStore {
    pub fn new() -> Self {
        Self { tables: Mutex::new(HashMap::new()) }
    }

    fn json_to_sql(value: &Value) -> SqlValue {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(*b as i64),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    SqlValue::Real(f)
                } else {
                    SqlValue::Null
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }

    fn sql_to_json(value: rusqlite::types::ValueRef) -> Value {
        match value {
            rusqlite::types::ValueRef::Null => Value::Null,
            rusqlite::types::ValueRef::Integer(i) => Value::from(i),
            rusqlite::types::ValueRef::Real(f) => {
                serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
            }
            rusqlite::types::ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
            rusqlite::types::ValueRef::Blob(_) => Value::String("<blob>".to_string()),
        }
    }
}

impl Default for SqliteResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SqlResultStore for SqliteResultStore {
    async fn store(&self, id: &str, data: TabularData) -> Result<DataReference, Error> {
        let conn = Connection::open_in_memory().map_err(|e| Error::SqlResult(e.to_string()))?;

        let column_defs: Vec<String> = data.columns.iter().map(|c| format!("\"{c}\" TEXT")).collect();
        let create_sql = if column_defs.is_empty() {
            "CREATE TABLE results (_empty INTEGER)".to_string()
        } else {
            format!("CREATE TABLE results ({})", column_defs.join(", "))
        };
        conn.execute(&create_sql, []).map_err(|e| Error::SqlResult(e.to_string()))?;

        if !data.columns.is_empty() {
            let placeholders: Vec<String> = (1..=data.columns.len()).map(|i| format!("?{i}")).collect();
            let insert_sql = format!("INSERT INTO results VALUES ({})", placeholders.join(", "));
            let mut stmt = conn.prepare(&insert_sql).map_err(|e| Error::SqlResult(e.to_string()))?;
            for row in &data.rows {
                let sql_values: Vec<SqlValue> = row.iter().map(Self::json_to_sql).collect();
                stmt.execute(rusqlite::params_from_iter(sql_values)).map_err(|e| Error::SqlResult(e.to_string()))?;
            }
        }

        self.tables.lock().expect("sql result store lock poisoned").insert(id.to_string(), (conn, data.columns.clone()));

        Ok(DataReference {
            id: id.to_string(),
            location: shuttle_core::model::DataLocation::SqlTable,
            metadata: HashMap::new(),
        })
    }

    async fn query(&self, reference: &str, sql: &str) -> Result<TabularData, Error> {
        let normalized = sql.trim_start().to_uppercase();
        if !normalized.starts_with("SELECT") {
            return Err(Error::SqlResult("only SELECT statements are permitted against a result table".to_string()));
        }

        let tables = self.tables.lock().expect("sql result store lock poisoned");
        let (conn, columns) = tables
            .get(reference)
            .ok_or_else(|| Error::SqlResult(format!("no such result table: {reference}")))?;

        let mut stmt = conn.prepare(sql).map_err(|e| Error::SqlResult(e.to_string()))?;
        let out_columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let width = out_columns.len();

        let rows: Vec<Vec<Value>> = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(Self::sql_to_json(row.get_ref(i)?));
                }
                Ok(values)
            })
            .map_err(|e| Error::SqlResult(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| Error::SqlResult(e.to_string()))?;

        let out_columns = if out_columns.is_empty() { columns.clone() } else { out_columns };
        Ok(TabularData { columns: out_columns, rows })
    }

    async fn get_metadata(&self, reference: &str) -> Result<TableMetadata, Error> {
        let tables = self.tables.lock().expect("sql result store lock poisoned");
        let (conn, columns) = tables
            .get(reference)
            .ok_or_else(|| Error::SqlResult(format!("no such result table: {reference}")))?;
        let row_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))
            .map_err(|e| Error::SqlResult(e.to_string()))?;
        Ok(TableMetadata {
            row_count: row_count as usize,
            column_count: columns.len(),
            columns: columns.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn stores_and_pages_through_a_large_result() {
        let store = SqliteResultStore::new();
        let rows: Vec<Vec<Value>> = (0..1000).map(|i| vec![json!(i), json!(i * 2)]).collect();
        let data = TabularData { columns: vec!["a".to_string(), "b".to_string()], rows };
        let reference = store.store("r1", data).await.unwrap();

        let page = store.query(&reference.id, "SELECT * FROM results LIMIT 10").await.unwrap();
        assert_eq!(page.rows.len(), 10);

        let metadata = store.get_metadata(&reference.id).await.unwrap();
        assert_eq!(metadata.row_count, 1000);
        assert_eq!(metadata.column_count, 2);
    }

    #[tokio::test]
    async fn count_query_returns_total_row_count() {
        let store = SqliteResultStore::new();
        let rows: Vec<Vec<Value>> = (0..20_000).map(|i| vec![json!(i)]).collect();
        let data = TabularData { columns: vec!["a".to_string()], rows };
        let reference = store.store("big", data).await.unwrap();
        let counted = store.query(&reference.id, "SELECT COUNT(*) FROM results").await.unwrap();
        assert_eq!(counted.rows[0][0], json!(20_000));
    }

    #[tokio::test]
    async fn non_select_statements_are_rejected() {
        let store = SqliteResultStore::new();
        let data = TabularData { columns: vec!["a".to_string()], rows: vec![] };
        let reference = store.store("r2", data).await.unwrap();
        let err = store.query(&reference.id, "DROP TABLE results").await.unwrap_err();
        assert!(matches!(err, Error::SqlResult(_)));
    }

    #[tokio::test]
    async fn unknown_reference_errors() {
        let store = SqliteResultStore::new();
        assert!(store.get_metadata("missing").await.is_err());
    }
}
