//! Indexed Tool Catalog (C7) interface.
//!
//! A persistent, full-text searchable index over every tool this process
//! knows about, whether compiled in, reachable over a remote server, or
//! registered by a plugin. The concrete SQLite-backed implementation lives
//! in the `shuttle-store` crate; this module defines only the trait and
//! wire-format data model so the executor and resolver can depend on it
//! without depending on SQLite.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::resolver::{BuiltinProvider, ServerClientManager};

/// Where a catalog entry's concrete tool comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Builtin,
    RemoteServer,
    Custom,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Builtin => "builtin",
            SourceKind::RemoteServer => "remote_server",
            SourceKind::Custom => "custom",
        }
    }
}

/// A single row in the catalog. `id` is `"<source>:<server>:<name>"` for
/// remote-server entries and `"<source>:<name>"` otherwise, and is unique;
/// `(source, name)` uniquely identifies a tool for dynamic resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedTool {
    pub id: String,
    pub name: String,
    pub description: String,
    pub source: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// Serialized JSON of the tool's input schema.
    pub input_schema: String,
    /// RFC 3339 UTC timestamp.
    pub indexed_at: String,
    pub capabilities: HashSet<String>,
    pub keywords: HashSet<String>,
    pub requires_approval: bool,
}

impl IndexedTool {
    pub fn make_id(source: SourceKind, server_name: Option<&str>, name: &str) -> String {
        match server_name {
            Some(server) => format!("{}:{}:{}", source.as_str(), server, name),
            None => format!("{}:{}", source.as_str(), name),
        }
    }
}

/// Trade latency for ranking quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Keyword/full-text only, millisecond budget.
    Fast,
    /// FTS plus re-ranking.
    Balanced,
    /// Full pipeline with semantic ranking.
    Accurate,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub include_schema: bool,
    pub limit: usize,
}

impl SearchRequest {
    /// The exact-name, single-result lookup the dynamic resolver issues on
    /// a registry miss.
    pub fn exact(name: &str) -> Self {
        Self {
            query: name.to_string(),
            mode: SearchMode::Fast,
            include_schema: true,
            limit: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub tool: IndexedTool,
    pub confidence: f32,
    pub match_reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct IndexSummary {
    pub indexers_run: usize,
    pub tools_indexed: usize,
}

/// One plug-in source of catalog entries (builtin enumerator, remote-server
/// enumerator, ...). `run` emits the `IndexedTool` rows it discovered.
#[async_trait]
pub trait Indexer: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> Result<Vec<IndexedTool>, Error>;
}

fn tag_tool(mut tool: IndexedTool) -> IndexedTool {
    tool.capabilities = extraction::extract_capabilities(&tool.name, &tool.description);
    tool.keywords = extraction::extract_keywords(&tool.name, &tool.description);
    tool.requires_approval = extraction::requires_approval(&tool.name);
    tool
}

/// Enumerates every tool the embedding application compiles in, via the
/// installed [`BuiltinProvider`], and emits `builtin:<name>` records.
pub struct BuiltinIndexer {
    provider: Arc<dyn BuiltinProvider>,
}

impl BuiltinIndexer {
    pub fn new(provider: Arc<dyn BuiltinProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Indexer for BuiltinIndexer {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn run(&self) -> Result<Vec<IndexedTool>, Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let tools = self
            .provider
            .list_tools()
            .await
            .into_iter()
            .map(|tool| {
                tag_tool(IndexedTool {
                    id: IndexedTool::make_id(SourceKind::Builtin, None, tool.name()),
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    source: SourceKind::Builtin,
                    server_name: None,
                    input_schema: serde_json::to_string(&tool.input_schema()).unwrap_or_else(|_| "{}".to_string()),
                    indexed_at: now.clone(),
                    capabilities: HashSet::new(),
                    keywords: HashSet::new(),
                    requires_approval: false,
                })
            })
            .collect();
        Ok(tools)
    }
}

/// Enumerates every tool offered by each currently connected remote server,
/// via the installed [`ServerClientManager`], and emits `<server>:<name>`
/// records. Capability/keyword/approval tags are (re-)derived here from the
/// tool's name and description, the same rule tables the builtin indexer
/// uses, since a remote server's own tool listing carries none of those.
pub struct RemoteIndexer {
    manager: Arc<dyn ServerClientManager>,
}

impl RemoteIndexer {
    pub fn new(manager: Arc<dyn ServerClientManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Indexer for RemoteIndexer {
    fn name(&self) -> &str {
        "remote"
    }

    async fn run(&self) -> Result<Vec<IndexedTool>, Error> {
        let mut tools = Vec::new();
        for server_name in self.manager.server_names() {
            let Some(client) = self.manager.get_client(&server_name) else {
                continue;
            };
            let listed = client.list_tools().await?;
            tools.extend(listed.into_iter().map(tag_tool));
        }
        Ok(tools)
    }
}

#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// Runs every registered indexer and upserts their output.
    async fn index_all(&self) -> Result<IndexSummary, Error>;

    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchMatch>, Error>;

    async fn get_tool(&self, id: &str) -> Result<Option<IndexedTool>, Error>;

    /// Inserts or updates a single row, keyed by `tool.id`.
    async fn upsert(&self, tool: IndexedTool) -> Result<(), Error>;
}

/// Shared rule tables used by the builtin/remote indexers to tag a tool
/// with capabilities and keywords from its name and description.
pub mod extraction {
    use std::collections::HashSet;

    const CAPABILITY_RULES: &[(&str, &[&str])] = &[
        ("file_io", &["file", "read", "write", "directory", "path"]),
        ("http", &["http", "fetch", "request", "url", "api"]),
        ("database", &["sql", "database", "query", "table", "db"]),
        ("notification", &["notify", "webhook", "alert", "email"]),
        ("shell", &["shell", "command", "exec", "bash", "process"]),
        ("search", &["search", "find", "lookup", "query"]),
        ("transform", &["transform", "convert", "parse", "format"]),
        ("validate", &["validate", "check", "verify", "lint"]),
        ("generate", &["generate", "create", "build", "scaffold"]),
        ("analyze", &["analyze", "inspect", "report", "audit"]),
        ("web_search", &["web_search", "google", "bing", "browse"]),
        ("code", &["code", "function", "class", "compile", "refactor"]),
        ("git", &["git", "commit", "branch", "repository", "diff"]),
        ("kubernetes", &["kubernetes", "k8s", "pod", "namespace", "cluster"]),
        ("aws", &["aws", "s3", "ec2", "lambda", "cloudformation"]),
        ("visualization", &["chart", "graph", "plot", "visualize", "diagram"]),
    ];

    const STOPWORDS: &[&str] = &[
        "the", "and", "for", "with", "from", "this", "that", "into", "over", "your", "you",
        "are", "will", "can", "not", "all", "any", "use", "used", "using",
    ];

    pub fn extract_capabilities(name: &str, description: &str) -> HashSet<String> {
        let haystack = format!("{} {}", name, description).to_lowercase();
        CAPABILITY_RULES
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| haystack.contains(kw)))
            .map(|(tag, _)| tag.to_string())
            .collect()
    }

    pub fn extract_keywords(name: &str, description: &str) -> HashSet<String> {
        let haystack = format!("{} {}", name, description).to_lowercase();
        let mut keywords = HashSet::new();
        for token in haystack.split(|c: char| !c.is_alphanumeric() && c != '_') {
            if token.len() < 3 || STOPWORDS.contains(&token) {
                continue;
            }
            keywords.insert(token.to_string());
            if keywords.len() >= 20 {
                break;
            }
        }
        keywords
    }

    const APPROVAL_SUBSTRINGS: &[&str] = &["bash", "exec", "write"];

    pub fn requires_approval(name: &str) -> bool {
        let lower = name.to_lowercase();
        APPROVAL_SUBSTRINGS.iter().any(|s| lower.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::extraction::*;

    #[test]
    fn capability_extraction_matches_keyword_table() {
        let caps = extract_capabilities("http_request", "Makes an HTTP GET request to a URL");
        assert!(caps.contains("http"));
    }

    #[test]
    fn keyword_extraction_drops_stopwords_and_short_tokens() {
        let keywords = extract_keywords("read_file", "Reads the contents of a file from disk");
        assert!(!keywords.contains("the"));
        assert!(!keywords.contains("of"));
        assert!(keywords.contains("contents"));
        assert!(keywords.len() <= 20);
    }

    #[test]
    fn approval_substrings_flag_bash_exec_write() {
        assert!(requires_approval("Bash"));
        assert!(requires_approval("exec_shell"));
        assert!(requires_approval("WriteFile"));
        assert!(!requires_approval("ReadFile"));
    }
}

#[cfg(test)]
mod indexer_tests {
    use super::*;
    use crate::model::{JsonSchema, ToolResult};
    use crate::tool::{BoxFuture, Tool, ToolContext};
    use serde_json::{json, Value};

    struct StubTool {
        name: &'static str,
        description: &'static str,
    }

    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            self.description
        }
        fn input_schema(&self) -> JsonSchema {
            JsonSchema::object()
        }
        fn execute(&self, _ctx: ToolContext, _params: Value) -> BoxFuture<'_, Result<ToolResult, Error>> {
            Box::pin(async move { Ok(ToolResult::success(json!({}))) })
        }
    }

    struct StubProvider(Vec<Arc<dyn Tool>>);

    #[async_trait]
    impl BuiltinProvider for StubProvider {
        async fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
            self.0.iter().find(|t| t.name() == name).cloned()
        }
        async fn list_tools(&self) -> Vec<Arc<dyn Tool>> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn builtin_indexer_emits_tagged_records_for_every_provider_tool() {
        let provider: Arc<dyn BuiltinProvider> = Arc::new(StubProvider(vec![Arc::new(StubTool {
            name: "bash",
            description: "executes a shell command",
        })]));
        let indexer = BuiltinIndexer::new(provider);
        let tools = indexer.run().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].id, "builtin:bash");
        assert_eq!(tools[0].source, SourceKind::Builtin);
        assert!(tools[0].requires_approval);
        assert!(tools[0].capabilities.contains("shell"));
    }

    struct StubServerClient(Vec<IndexedTool>);

    #[async_trait]
    impl crate::resolver::ServerClient for StubServerClient {
        async fn call_tool(&self, _name: &str, _args: Value) -> Result<Value, Error> {
            unimplemented!()
        }
        async fn list_tools(&self) -> Result<Vec<IndexedTool>, Error> {
            Ok(self.0.clone())
        }
    }

    struct StubManager(std::collections::HashMap<String, Arc<dyn crate::resolver::ServerClient>>);

    impl ServerClientManager for StubManager {
        fn get_client(&self, server_name: &str) -> Option<Arc<dyn crate::resolver::ServerClient>> {
            self.0.get(server_name).cloned()
        }
        fn server_names(&self) -> Vec<String> {
            self.0.keys().cloned().collect()
        }
    }

    #[tokio::test]
    async fn remote_indexer_tags_every_connected_servers_tools() {
        let untagged = IndexedTool {
            id: "remote_server:playwright:browser_click".to_string(),
            name: "browser_click".to_string(),
            description: "clicks an element in the browser".to_string(),
            source: SourceKind::RemoteServer,
            server_name: Some("playwright".to_string()),
            input_schema: "{}".to_string(),
            indexed_at: "2026-01-01T00:00:00Z".to_string(),
            capabilities: HashSet::new(),
            keywords: HashSet::new(),
            requires_approval: false,
        };
        let mut servers: std::collections::HashMap<String, Arc<dyn crate::resolver::ServerClient>> =
            std::collections::HashMap::new();
        servers.insert("playwright".to_string(), Arc::new(StubServerClient(vec![untagged])));
        let manager: Arc<dyn ServerClientManager> = Arc::new(StubManager(servers));

        let indexer = RemoteIndexer::new(manager);
        let tools = indexer.run().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].id, "remote_server:playwright:browser_click");
        assert!(tools[0].keywords.contains("browser_click") || tools[0].keywords.contains("clicks"));
    }

    #[tokio::test]
    async fn remote_indexer_with_no_connected_servers_is_empty() {
        let manager: Arc<dyn ServerClientManager> = Arc::new(StubManager(std::collections::HashMap::new()));
        let indexer = RemoteIndexer::new(manager);
        assert!(indexer.run().await.unwrap().is_empty());
    }
}
