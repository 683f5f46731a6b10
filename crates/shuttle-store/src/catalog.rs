//! SQLite-backed Indexed Tool Catalog (C7), with an FTS5 full-text index
//! over name/description/keywords and a LIKE fallback when the SQLite
//! build lacks FTS5 compiled in.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use shuttle_core::catalog::{IndexSummary, IndexedTool, Indexer, SearchMatch, SearchRequest, SourceKind, ToolCatalog};
use shuttle_core::error::{codes, Error};

pub struct SqliteCatalog {
    db_path: PathBuf,
    has_fts: bool,
    indexers: Vec<Box<dyn Indexer>>,
}

impl SqliteCatalog {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, Error> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        let mut catalog = Self { db_path, has_fts: false, indexers: Vec::new() };
        catalog.ensure_schema()?;
        Ok(catalog)
    }

    pub fn with_indexer(mut self, indexer: Box<dyn Indexer>) -> Self {
        self.indexers.push(indexer);
        self
    }

    fn connect(&self) -> Result<Connection, Error> {
        let conn = Connection::open(&self.db_path).map_err(|e| Error::Catalog(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=3000;")
            .map_err(|e| Error::Catalog(e.to_string()))?;
        Ok(conn)
    }

    fn ensure_schema(&mut self) -> Result<(), Error> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tools (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                source TEXT NOT NULL,
                server_name TEXT,
                input_schema TEXT NOT NULL,
                indexed_at TEXT NOT NULL,
                capabilities TEXT NOT NULL,
                keywords TEXT NOT NULL,
                requires_approval INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::Catalog(e.to_string()))?;

        match conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS tools_fts USING fts5(
                name, description, keywords, content='tools', content_rowid='rowid'
            )",
            [],
        ) {
            Ok(_) => self.has_fts = true,
            Err(_) => {
                tracing::debug!("FTS5 not available for tool catalog; falling back to LIKE search");
                self.has_fts = false;
            }
        }

        Ok(())
    }

    fn row_to_tool(row: &rusqlite::Row) -> rusqlite::Result<IndexedTool> {
        let source_str: String = row.get("source")?;
        let capabilities_str: String = row.get("capabilities")?;
        let keywords_str: String = row.get("keywords")?;
        Ok(IndexedTool {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            source: parse_source(&source_str),
            server_name: row.get("server_name")?,
            input_schema: row.get("input_schema")?,
            indexed_at: row.get("indexed_at")?,
            capabilities: split_set(&capabilities_str),
            keywords: split_set(&keywords_str),
            requires_approval: row.get::<_, i64>("requires_approval")? != 0,
        })
    }

    fn upsert_sync(conn: &Connection, tool: &IndexedTool) -> Result<(), Error> {
        conn.execute(
            "INSERT INTO tools (id, name, description, source, server_name, input_schema, indexed_at, capabilities, keywords, requires_approval)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name=excluded.name, description=excluded.description, source=excluded.source,
                server_name=excluded.server_name, input_schema=excluded.input_schema,
                indexed_at=excluded.indexed_at, capabilities=excluded.capabilities,
                keywords=excluded.keywords, requires_approval=excluded.requires_approval",
            params![
                tool.id,
                tool.name,
                tool.description,
                tool.source.as_str(),
                tool.server_name,
                tool.input_schema,
                tool.indexed_at,
                join_set(&tool.capabilities),
                join_set(&tool.keywords),
                tool.requires_approval as i64,
            ],
        )
        .map_err(|e| Error::Catalog(e.to_string()))?;

        conn.execute(
            "INSERT INTO tools_fts(rowid, name, description, keywords)
             SELECT rowid, name, description, keywords FROM tools WHERE id = ?1",
            params![tool.id],
        )
        .ok();

        Ok(())
    }
}

fn parse_source(s: &str) -> SourceKind {
    match s {
        "remote_server" => SourceKind::RemoteServer,
        "custom" => SourceKind::Custom,
        _ => SourceKind::Builtin,
    }
}

fn join_set(set: &HashSet<String>) -> String {
    let mut items: Vec<&String> = set.iter().collect();
    items.sort();
    items.into_iter().cloned().collect::<Vec<_>>().join(",")
}

fn split_set(joined: &str) -> HashSet<String> {
    if joined.is_empty() {
        HashSet::new()
    } else {
        joined.split(',').map(str::to_string).collect()
    }
}

#[async_trait]
impl ToolCatalog for SqliteCatalog {
    async fn index_all(&self) -> Result<IndexSummary, Error> {
        let mut summary = IndexSummary::default();
        for indexer in &self.indexers {
            let tools = indexer.run().await?;
            for tool in &tools {
                self.upsert(tool.clone()).await?;
            }
            summary.indexers_run += 1;
            summary.tools_indexed += tools.len();
        }
        Ok(summary)
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchMatch>, Error> {
        let db_path = self.db_path.clone();
        let has_fts = self.has_fts;
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| Error::Catalog(e.to_string()))?;

            if has_fts {
                let query_terms = fts_terms(&request.query);
                if !query_terms.is_empty() {
                    let mut stmt = conn
                        .prepare(
                            "SELECT t.id, t.name, t.description, t.source, t.server_name, t.input_schema,
                                    t.indexed_at, t.capabilities, t.keywords, t.requires_approval
                             FROM tools_fts
                             JOIN tools t ON tools_fts.rowid = t.rowid
                             WHERE tools_fts MATCH ?1
                             ORDER BY bm25(tools_fts)
                             LIMIT ?2",
                        )
                        .map_err(|e| Error::Catalog(e.to_string()))?;
                    let rows: Result<Vec<IndexedTool>, _> =
                        stmt.query_map(params![query_terms, request.limit as i64], SqliteCatalog::row_to_tool)
                            .map_err(|e| Error::Catalog(e.to_string()))?
                            .collect();
                    if let Ok(tools) = rows {
                        return Ok(tools
                            .into_iter()
                            .map(|tool| SearchMatch { tool, confidence: 1.0, match_reason: "fts".to_string() })
                            .collect());
                    }
                }
            }

            let exact_or_like = if request.query.contains(' ') {
                format!("%{}%", request.query)
            } else {
                request.query.clone()
            };
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, description, source, server_name, input_schema, indexed_at,
                            capabilities, keywords, requires_approval
                     FROM tools WHERE name = ?1 OR name LIKE ?2 OR description LIKE ?2
                     LIMIT ?3",
                )
                .map_err(|e| Error::Catalog(e.to_string()))?;
            let tools: Vec<IndexedTool> = stmt
                .query_map(params![request.query, exact_or_like, request.limit as i64], SqliteCatalog::row_to_tool)
                .map_err(|e| Error::Catalog(e.to_string()))?
                .filter_map(|r| r.ok())
                .collect();

            Ok(tools
                .into_iter()
                .map(|tool| {
                    let confidence = if tool.name == request.query { 1.0 } else { 0.5 };
                    SearchMatch { tool, confidence, match_reason: "like".to_string() }
                })
                .collect())
        })
        .await
        .map_err(|e| Error::Catalog(format!("search task panicked: {e}")))?
    }

    async fn get_tool(&self, id: &str) -> Result<Option<IndexedTool>, Error> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| Error::Catalog(e.to_string()))?;
            conn.query_row(
                "SELECT id, name, description, source, server_name, input_schema, indexed_at,
                        capabilities, keywords, requires_approval
                 FROM tools WHERE id = ?1",
                params![id],
                SqliteCatalog::row_to_tool,
            )
            .map(Some)
            .or_else(|e| if matches!(e, rusqlite::Error::QueryReturnedNoRows) { Ok(None) } else { Err(Error::Catalog(e.to_string())) })
        })
        .await
        .map_err(|e| Error::Catalog(format!("get_tool task panicked: {e}")))?
    }

    async fn upsert(&self, tool: IndexedTool) -> Result<(), Error> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).map_err(|e| Error::Catalog(e.to_string()))?;
            SqliteCatalog::upsert_sync(&conn, &tool)
        })
        .await
        .map_err(|e| Error::Catalog(format!("upsert task panicked: {e}")))?
    }
}

fn fts_terms(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|t| t.len() >= 2)
        .map(|t| format!("{t}*"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Surfaces a parse error on the caller rather than swallowing it, per the
/// metadata-file contract this catalog's `SEARCH_FAILED`/`INVALID_QUERY`
/// error codes cover on the executor side.
pub fn invalid_query(detail: impl Into<String>) -> Error {
    Error::Catalog(format!("{}: {}", codes::INVALID_QUERY, detail.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::tempdir;

    fn sample_tool(name: &str) -> IndexedTool {
        IndexedTool {
            id: format!("builtin:{name}"),
            name: name.to_string(),
            description: format!("Tool that performs {name}"),
            source: SourceKind::Builtin,
            server_name: None,
            input_schema: "{}".to_string(),
            indexed_at: "2026-01-01T00:00:00Z".to_string(),
            capabilities: HashSet::new(),
            keywords: HashSet::new(),
            requires_approval: false,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let catalog = SqliteCatalog::new(dir.path().join("catalog.sqlite3")).unwrap();
        catalog.upsert(sample_tool("http_request")).await.unwrap();
        let fetched = catalog.get_tool("builtin:http_request").await.unwrap().unwrap();
        assert_eq!(fetched.name, "http_request");
    }

    #[tokio::test]
    async fn upsert_twice_replaces_not_duplicates() {
        let dir = tempdir().unwrap();
        let catalog = SqliteCatalog::new(dir.path().join("catalog.sqlite3")).unwrap();
        catalog.upsert(sample_tool("http_request")).await.unwrap();
        let mut updated = sample_tool("http_request");
        updated.description = "updated description".to_string();
        catalog.upsert(updated).await.unwrap();
        let fetched = catalog.get_tool("builtin:http_request").await.unwrap().unwrap();
        assert_eq!(fetched.description, "updated description");
    }

    #[tokio::test]
    async fn search_finds_exact_name() {
        let dir = tempdir().unwrap();
        let catalog = SqliteCatalog::new(dir.path().join("catalog.sqlite3")).unwrap();
        catalog.upsert(sample_tool("http_request")).await.unwrap();
        let matches = catalog.search(SearchRequest::exact("http_request")).await.unwrap();
        assert!(!matches.is_empty());
        assert_eq!(matches[0].tool.name, "http_request");
    }

    #[tokio::test]
    async fn missing_tool_lookup_is_none_not_error() {
        let dir = tempdir().unwrap();
        let catalog = SqliteCatalog::new(dir.path().join("catalog.sqlite3")).unwrap();
        assert!(catalog.get_tool("builtin:nope").await.unwrap().is_none());
    }
}
