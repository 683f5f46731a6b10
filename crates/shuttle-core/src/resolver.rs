//! Dynamic Resolver (C8): materializes a proxy Tool from a catalog entry
//! the first time a name misses the local registry.
//!
//! [`ServerClient`] and [`ServerClientManager`] are the capability surfaces
//! a server-client implementation (the `shuttle-mcp` crate, in this
//! workspace) provides concretely, rather than this crate ducktyping an
//! opaque handle at runtime — avoiding a cyclic dependency between the two
//! crates without giving up compile-time checking.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::catalog::{IndexedTool, SearchRequest, SourceKind, ToolCatalog};
use crate::error::Error;
use crate::model::{normalize_schema, JsonSchema, ToolResult};
use crate::registry::LocalRegistry;
use crate::tool::{BoxFuture, Tool, ToolContext};

/// External collaborator: resolves a builtin (locally compiled) tool by
/// name. Concrete providers are supplied by the embedding application.
#[async_trait]
pub trait BuiltinProvider: Send + Sync {
    async fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>>;

    /// Every tool this provider can hand out, for the catalog's builtin
    /// indexer. Order is not significant.
    async fn list_tools(&self) -> Vec<Arc<dyn Tool>>;
}

/// A handle to one connected remote tool server. The capability a
/// `remote_server` catalog source needs: call a named tool, and list what
/// it offers (for the catalog's own remote indexer).
#[async_trait]
pub trait ServerClient: Send + Sync {
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, Error>;

    async fn list_tools(&self) -> Result<Vec<IndexedTool>, Error>;
}

/// External collaborator: looks up a connected server's client by name.
pub trait ServerClientManager: Send + Sync {
    fn get_client(&self, server_name: &str) -> Option<Arc<dyn ServerClient>>;

    /// Names of every currently connected server, for the catalog's remote
    /// indexer to enumerate.
    fn server_names(&self) -> Vec<String>;
}

/// On a registry miss, consults the catalog and, on a match, materializes
/// a concrete `Tool` (a builtin looked up through the builtin provider, or
/// a proxy that forwards to a remote server) and registers it so that
/// subsequent executions bypass this resolver entirely.
pub struct DynamicResolver {
    pub catalog: Option<Arc<dyn ToolCatalog>>,
    pub builtin_provider: Option<Arc<dyn BuiltinProvider>>,
    pub server_manager: Option<Arc<dyn ServerClientManager>>,
}

impl DynamicResolver {
    pub fn new() -> Self {
        Self {
            catalog: None,
            builtin_provider: None,
            server_manager: None,
        }
    }

    pub async fn resolve(&self, name: &str, registry: &LocalRegistry) -> Result<Arc<dyn Tool>, Error> {
        let Some(catalog) = &self.catalog else {
            return Err(Error::ToolNotFound(name.to_string()));
        };

        let matches = catalog
            .search(SearchRequest::exact(name))
            .await
            .map_err(|e| Error::Resolver(format!("catalog search for '{name}' failed: {e}")))?;

        let Some(found) = matches.into_iter().next() else {
            return Err(Error::ToolNotFound(name.to_string()));
        };
        let indexed = found.tool;

        let tool: Arc<dyn Tool> = match indexed.source {
            SourceKind::Builtin => {
                let provider = self
                    .builtin_provider
                    .as_ref()
                    .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
                provider
                    .get_tool(&indexed.name)
                    .await
                    .ok_or_else(|| Error::ToolNotFound(format!("tool not found: {name}")))?
            }
            SourceKind::RemoteServer => {
                let server_name = indexed
                    .server_name
                    .clone()
                    .ok_or_else(|| Error::Resolver(format!("remote_server entry '{}' missing server_name", indexed.id)))?;
                let manager = self
                    .server_manager
                    .as_ref()
                    .ok_or_else(|| Error::Resolver("no server-client manager installed".to_string()))?;
                let client = manager
                    .get_client(&server_name)
                    .ok_or_else(|| Error::Resolver(format!("no connected client for server '{server_name}'")))?;

                let schema: JsonSchema = serde_json::from_str(&indexed.input_schema).unwrap_or_else(|_| JsonSchema::object());

                Arc::new(RemoteToolProxy {
                    name: indexed.name.clone(),
                    server_name,
                    schema: normalize_schema(&schema),
                    client,
                })
            }
            SourceKind::Custom => {
                return Err(Error::Resolver("custom tool source is not supported".to_string()));
            }
        };

        registry.register(tool.clone());
        Ok(tool)
    }
}

impl Default for DynamicResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// A locally-registered stand-in for a tool actually executed by a remote
/// MCP-style server.
struct RemoteToolProxy {
    name: String,
    server_name: String,
    schema: JsonSchema,
    client: Arc<dyn ServerClient>,
}

impl Tool for RemoteToolProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "remote tool"
    }

    fn input_schema(&self) -> JsonSchema {
        self.schema.clone()
    }

    fn backend(&self) -> &str {
        &self.server_name
    }

    fn execute(&self, _ctx: ToolContext, params: Value) -> BoxFuture<'_, Result<ToolResult, Error>> {
        Box::pin(async move {
            let raw = self.client.call_tool(&self.name, params).await?;
            let data = crate::content::extract_remote_content(&raw);
            Ok(ToolResult::success(data)
                .with_metadata("mcp_server", Value::String(self.server_name.clone()))
                .with_metadata("mcp_tool", Value::String(self.name.clone())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IndexSummary, SearchMatch};
    use std::collections::HashSet;

    struct EmptyCatalog;

    #[async_trait]
    impl ToolCatalog for EmptyCatalog {
        async fn index_all(&self) -> Result<IndexSummary, Error> {
            Ok(IndexSummary::default())
        }
        async fn search(&self, _request: SearchRequest) -> Result<Vec<SearchMatch>, Error> {
            Ok(vec![])
        }
        async fn get_tool(&self, _id: &str) -> Result<Option<IndexedTool>, Error> {
            Ok(None)
        }
        async fn upsert(&self, _tool: IndexedTool) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn resolve_without_catalog_is_transparent_not_found() {
        let resolver = DynamicResolver::new();
        let registry = LocalRegistry::new();
        let err = resolver.resolve("missing", &registry).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn resolve_with_empty_catalog_is_not_found() {
        let mut resolver = DynamicResolver::new();
        resolver.catalog = Some(Arc::new(EmptyCatalog));
        let registry = LocalRegistry::new();
        let err = resolver.resolve("http_request", &registry).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }

    struct OneShotCatalog(IndexedTool);

    #[async_trait]
    impl ToolCatalog for OneShotCatalog {
        async fn index_all(&self) -> Result<IndexSummary, Error> {
            Ok(IndexSummary::default())
        }
        async fn search(&self, _request: SearchRequest) -> Result<Vec<SearchMatch>, Error> {
            Ok(vec![SearchMatch {
                tool: self.0.clone(),
                confidence: 1.0,
                match_reason: "exact".to_string(),
            }])
        }
        async fn get_tool(&self, _id: &str) -> Result<Option<IndexedTool>, Error> {
            Ok(Some(self.0.clone()))
        }
        async fn upsert(&self, _tool: IndexedTool) -> Result<(), Error> {
            Ok(())
        }
    }

    struct EchoTool {
        name: String,
    }

    impl Tool for EchoTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn input_schema(&self) -> JsonSchema {
            JsonSchema::object()
        }
        fn execute(&self, _ctx: ToolContext, params: Value) -> BoxFuture<'_, Result<ToolResult, Error>> {
            Box::pin(async move { Ok(ToolResult::success(params)) })
        }
    }

    struct StubBuiltinProvider;

    #[async_trait]
    impl BuiltinProvider for StubBuiltinProvider {
        async fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
            Some(Arc::new(EchoTool { name: name.to_string() }))
        }

        async fn list_tools(&self) -> Vec<Arc<dyn Tool>> {
            vec![]
        }
    }

    #[tokio::test]
    async fn builtin_resolution_registers_into_local_registry() {
        let indexed = IndexedTool {
            id: "builtin:http_request".to_string(),
            name: "http_request".to_string(),
            description: "".to_string(),
            source: SourceKind::Builtin,
            server_name: None,
            input_schema: "{}".to_string(),
            indexed_at: "2026-01-01T00:00:00Z".to_string(),
            capabilities: HashSet::new(),
            keywords: HashSet::new(),
            requires_approval: false,
        };
        let mut resolver = DynamicResolver::new();
        resolver.catalog = Some(Arc::new(OneShotCatalog(indexed)));
        resolver.builtin_provider = Some(Arc::new(StubBuiltinProvider));

        let registry = LocalRegistry::new();
        assert!(!registry.is_registered("http_request"));
        resolver.resolve("http_request", &registry).await.unwrap();
        assert!(registry.is_registered("http_request"));
    }

    #[tokio::test]
    async fn remote_resolution_without_manager_errors() {
        let indexed = IndexedTool {
            id: "remote_server:playwright:browser_click".to_string(),
            name: "browser_click".to_string(),
            description: "".to_string(),
            source: SourceKind::RemoteServer,
            server_name: Some("playwright".to_string()),
            input_schema: "{}".to_string(),
            indexed_at: "2026-01-01T00:00:00Z".to_string(),
            capabilities: HashSet::new(),
            keywords: HashSet::new(),
            requires_approval: false,
        };
        let mut resolver = DynamicResolver::new();
        resolver.catalog = Some(Arc::new(OneShotCatalog(indexed)));

        let registry = LocalRegistry::new();
        let err = resolver.resolve("browser_click", &registry).await.unwrap_err();
        assert!(matches!(err, Error::Resolver(_)));
    }
}
