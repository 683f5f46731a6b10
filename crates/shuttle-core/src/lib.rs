//! Shuttle Core - tool-dispatch and execution engine for multi-agent systems
//!
//! This crate provides the core, transport-agnostic machinery a host
//! application wires up to run tools on an agent's behalf:
//! - A local tool registry and the `Tool` trait every backend implements
//! - A federated, searchable catalog with lazy dynamic resolution of
//!   builtin and remote-server tools
//! - Large-payload offload to a shared-memory store and a SQL-queryable
//!   result store
//! - Permission/approval policy enforcement
//! - An instrumented executor tying the above into one request/response path

pub mod catalog;
pub mod config;
pub mod content;
pub mod error;
pub mod executor;
pub mod instrumented;
pub mod metadata;
pub mod model;
pub mod offload;
pub mod permission;
pub mod registry;
pub mod resolver;
pub mod tool;

pub use catalog::{
    IndexSummary, IndexedTool, Indexer, SearchMatch, SearchMode, SearchRequest, SourceKind, ToolCatalog,
};
pub use config::{defaults, Config, ConfigManager, McpServerConfig, McpTransport};
pub use content::extract_remote_content;
pub use error::{codes, Error, Result};
pub use executor::{Counters, CountersSnapshot, Executor, ExecutorBuilder};
pub use instrumented::InstrumentedExecutor;
pub use metadata::{MetadataCache, MetadataSource, ToolMetadata};
pub use model::{
    normalize_schema, DataLocation, DataMetadata, DataPreview, DataReference, DataSchema, DataType,
    ErrorInfo, JsonSchema, SchemaField, ToolResult,
};
pub use offload::{
    estimate_value_size, is_result_offload_exempt, is_sql_result, parse_tabular, SharedMemoryStore,
    SqlResultStore, StoreStats, TabularData, TableMetadata,
};
pub use permission::{ApprovalCallback, DefaultAction, Decision, PermissionPolicy};
pub use registry::LocalRegistry;
pub use resolver::{BuiltinProvider, DynamicResolver, ServerClient, ServerClientManager};
pub use tool::{BoxFuture, Tool, ToolContext, ToolRef};
