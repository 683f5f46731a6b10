//! Connection lifecycle for configured MCP servers, and the concrete
//! [`ServerClient`]/[`ServerClientManager`] implementations the dynamic
//! resolver (`shuttle-core::resolver`) consults on a registry miss.
//!
//! Starts, stops, and discovers tools for each configured server over a
//! real async JSON-RPC client (stdio or SSE transport).

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use shuttle_core::catalog::{IndexedTool, SourceKind};
use shuttle_core::error::Error;
use shuttle_core::resolver::{ServerClient, ServerClientManager};
use tokio::sync::RwLock;

use crate::client::{ClientInfo, McpClient};
use crate::transport::{SseTransport, StdioTransport, Transport};

const CLIENT_NAME: &str = "shuttle";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One connected remote tool server.
pub struct McpServerHandle {
    server_name: String,
    client: McpClient<Box<dyn Transport>>,
}

#[async_trait]
impl ServerClient for McpServerHandle {
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, Error> {
        let result = self
            .client
            .call_tool(name, args)
            .await
            .map_err(|e| Error::Mcp(format!("{}: {e}", self.server_name)))?;
        serde_json::to_value(result).map_err(Error::Serialization)
    }

    async fn list_tools(&self) -> Result<Vec<IndexedTool>, Error> {
        let tools = self
            .client
            .list_tools()
            .await
            .map_err(|e| Error::Mcp(format!("{}: {e}", self.server_name)))?;
        let now = chrono::Utc::now().to_rfc3339();
        Ok(tools
            .into_iter()
            .map(|tool| IndexedTool {
                id: format!("remote_server:{}:{}", self.server_name, tool.name),
                name: tool.name,
                description: tool.description,
                source: SourceKind::RemoteServer,
                server_name: Some(self.server_name.clone()),
                input_schema: tool.input_schema.to_string(),
                indexed_at: now.clone(),
                capabilities: HashSet::new(),
                keywords: HashSet::new(),
                requires_approval: false,
            })
            .collect())
    }
}

/// Spawns and owns a client per configured server, keyed by server name.
pub struct McpManager {
    servers: RwLock<HashMap<String, Arc<McpServerHandle>>>,
}

impl McpManager {
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
        }
    }

    /// Spawns a stdio-transport server and completes the MCP handshake.
    pub async fn connect_stdio(&self, server_name: &str, command: &str, args: &[String]) -> Result<(), Error> {
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let transport = StdioTransport::spawn(command, &arg_refs)
            .await
            .map_err(|e| Error::Mcp(format!("{server_name}: failed to spawn: {e}")))?;
        self.connect_with_transport(server_name, Box::new(transport)).await
    }

    /// Connects to an HTTP/SSE-transport server and completes the handshake.
    pub async fn connect_http(&self, server_name: &str, url: &str) -> Result<(), Error> {
        let transport = SseTransport::connect(url)
            .await
            .map_err(|e| Error::Mcp(format!("{server_name}: failed to open sse stream: {e}")))?;
        self.connect_with_transport(server_name, Box::new(transport)).await
    }

    async fn connect_with_transport(&self, server_name: &str, transport: Box<dyn Transport>) -> Result<(), Error> {
        let mut client = McpClient::new(transport);
        client
            .initialize(ClientInfo {
                name: CLIENT_NAME.to_string(),
                version: CLIENT_VERSION.to_string(),
            })
            .await
            .map_err(|e| Error::Mcp(format!("{server_name}: initialize failed: {e}")))?;

        let handle = Arc::new(McpServerHandle {
            server_name: server_name.to_string(),
            client,
        });
        self.servers.write().await.insert(server_name.to_string(), handle);
        Ok(())
    }

    pub async fn disconnect(&self, server_name: &str) {
        self.servers.write().await.remove(server_name);
    }

    pub async fn connected_servers(&self) -> Vec<String> {
        self.servers.read().await.keys().cloned().collect()
    }

    /// Discovers every remote tool offered by every connected server, for
    /// the catalog's own indexing pass.
    pub async fn discover_all(&self) -> Vec<IndexedTool> {
        let servers: Vec<Arc<McpServerHandle>> = self.servers.read().await.values().cloned().collect();
        let mut out = Vec::new();
        for server in servers {
            match server.list_tools().await {
                Ok(tools) => out.extend(tools),
                Err(e) => tracing::warn!(server = %server.server_name, error = %e, "failed to list remote tools"),
            }
        }
        out
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerClientManager for McpManager {
    fn get_client(&self, server_name: &str) -> Option<Arc<dyn ServerClient>> {
        self.servers.try_read().ok()?.get(server_name).map(|h| h.clone() as Arc<dyn ServerClient>)
    }

    fn server_names(&self) -> Vec<String> {
        self.servers.try_read().map(|s| s.keys().cloned().collect()).unwrap_or_default()
    }
}
