//! Executor (C5): the central request/response pipeline.
//!
//! Normalizes parameters, checks permissions, offloads and dereferences
//! large payloads, executes the tool, and shapes the result. Staged as
//! resolve -> check -> emit -> delegate -> summarize, with a builder for
//! wiring up the optional collaborators (permission policy, shared memory,
//! SQL result store).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::defaults::OFFLOAD_THRESHOLD_BYTES;
use crate::error::{codes, Error};
use crate::model::{normalize_schema, DataLocation, DataReference, DataType, ErrorInfo, JsonSchema, ToolResult};
use crate::offload::{
    estimate_value_size, is_result_offload_exempt, is_sql_result, parse_tabular, to_lower_underscore,
    SharedMemoryStore, SqlResultStore,
};
use crate::permission::{Decision, PermissionPolicy};
use crate::registry::LocalRegistry;
use crate::resolver::DynamicResolver;
use crate::tool::{Tool, ToolContext};

const DATA_REFERENCE_TAG: &str = "$data_reference";

fn tag_reference(reference: &DataReference) -> Value {
    json!({ DATA_REFERENCE_TAG: reference })
}

fn untag_reference(value: &Value) -> Option<DataReference> {
    value
        .as_object()?
        .get(DATA_REFERENCE_TAG)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Atomic counters for offload/deref activity. Not synchronized with
/// result mutation: a reader of `snapshot()` may observe any subset of
/// concurrent operations, by design.
#[derive(Default)]
pub struct Counters {
    stores: AtomicU64,
    derefs: AtomicU64,
    bytes_stored: AtomicU64,
    deref_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub stores: u64,
    pub derefs: u64,
    pub bytes_stored: u64,
    pub deref_errors: u64,
}

impl Counters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            stores: self.stores.load(Ordering::Relaxed),
            derefs: self.derefs.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
            deref_errors: self.deref_errors.load(Ordering::Relaxed),
        }
    }
}

pub struct Executor {
    registry: Arc<LocalRegistry>,
    resolver: DynamicResolver,
    permission: Option<PermissionPolicy>,
    shared_memory: Option<Arc<dyn SharedMemoryStore>>,
    sql_store: Option<Arc<dyn SqlResultStore>>,
    param_offload_threshold: usize,
    result_offload_threshold: usize,
    counters: Counters,
    next_ref_id: AtomicI64,
}

pub struct ExecutorBuilder {
    registry: Arc<LocalRegistry>,
    resolver: DynamicResolver,
    permission: Option<PermissionPolicy>,
    shared_memory: Option<Arc<dyn SharedMemoryStore>>,
    sql_store: Option<Arc<dyn SqlResultStore>>,
    param_offload_threshold: usize,
    result_offload_threshold: usize,
}

impl ExecutorBuilder {
    pub fn new(registry: Arc<LocalRegistry>) -> Self {
        Self {
            registry,
            resolver: DynamicResolver::new(),
            permission: None,
            shared_memory: None,
            sql_store: None,
            param_offload_threshold: OFFLOAD_THRESHOLD_BYTES,
            result_offload_threshold: OFFLOAD_THRESHOLD_BYTES,
        }
    }

    pub fn with_resolver(mut self, resolver: DynamicResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_permission(mut self, permission: PermissionPolicy) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn with_shared_memory(mut self, store: Arc<dyn SharedMemoryStore>) -> Self {
        self.shared_memory = Some(store);
        self
    }

    pub fn with_sql_store(mut self, store: Arc<dyn SqlResultStore>) -> Self {
        self.sql_store = Some(store);
        self
    }

    pub fn with_param_offload_threshold(mut self, threshold: usize) -> Self {
        self.param_offload_threshold = threshold;
        self
    }

    pub fn with_result_offload_threshold(mut self, threshold: usize) -> Self {
        self.result_offload_threshold = threshold;
        self
    }

    pub fn build(self) -> Executor {
        Executor {
            registry: self.registry,
            resolver: self.resolver,
            permission: self.permission,
            shared_memory: self.shared_memory,
            sql_store: self.sql_store,
            param_offload_threshold: self.param_offload_threshold,
            result_offload_threshold: self.result_offload_threshold,
            counters: Counters::default(),
            next_ref_id: AtomicI64::new(0),
        }
    }
}

impl Executor {
    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    pub fn registry(&self) -> &Arc<LocalRegistry> {
        &self.registry
    }

    fn fresh_reference_id(&self) -> String {
        let n = self.next_ref_id.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", Uuid::new_v4())
    }

    pub async fn execute(&self, ctx: ToolContext, tool_name: &str, params: Value) -> Result<ToolResult, Error> {
        let tool = match self.registry.get(tool_name) {
            Some(tool) => tool,
            None => match self.resolver.resolve(tool_name, &self.registry).await {
                Ok(tool) => tool,
                Err(resolver_err) => {
                    return Err(Error::ToolNotFound(format!("{tool_name} ({resolver_err})")));
                }
            },
        };

        self.execute_with_tool(ctx, tool, params).await
    }

    pub async fn execute_with_tool(
        &self,
        ctx: ToolContext,
        tool: Arc<dyn Tool>,
        params: Value,
    ) -> Result<ToolResult, Error> {
        let started_at = Instant::now();

        if let Some(policy) = &self.permission {
            if let Decision::Deny(error) = policy.check(tool.name(), &params) {
                return Ok(ToolResult::failure(error).with_execution_time_ms(elapsed_ms(started_at)));
            }
        }

        let schema = normalize_schema(&tool.input_schema());
        let normalized_params = self.normalize_param_names(&schema, params);

        let offloaded_params = match self.offload_params(normalized_params).await {
            Ok(params) => params,
            Err(error) => return Ok(ToolResult::failure(error).with_execution_time_ms(elapsed_ms(started_at))),
        };

        let dereffed_params = match self.deref_params(offloaded_params).await {
            Ok(params) => params,
            Err(error) => return Ok(ToolResult::failure(error).with_execution_time_ms(elapsed_ms(started_at))),
        };

        let mut result = match tool.execute(ctx, dereffed_params).await {
            Ok(result) => result,
            Err(transport_err) => {
                let retryable = matches!(transport_err, Error::Mcp(_));
                let mut error = ErrorInfo::new(codes::EXECUTION_FAILED, transport_err.to_string());
                if retryable {
                    error = error.retryable();
                }
                ToolResult::failure(error)
            }
        };

        if result.success && !is_result_offload_exempt(tool.name()) {
            self.offload_result(tool.name(), &mut result).await;
        }

        result.execution_time_ms = elapsed_ms(started_at);
        Ok(result)
    }

    /// Renames each incoming param whose lower-underscore form matches a
    /// schema key to that schema key's exact spelling. Unknown keys pass
    /// through untouched.
    fn normalize_param_names(&self, schema: &JsonSchema, params: Value) -> Value {
        let Some(properties) = &schema.properties else {
            return params;
        };
        let Some(obj) = params.as_object() else {
            return params;
        };

        let mut lowered_to_schema_key: HashMap<String, &String> = HashMap::new();
        for key in properties.keys() {
            lowered_to_schema_key.insert(to_lower_underscore(key), key);
        }

        let mut renamed = serde_json::Map::new();
        for (key, value) in obj {
            let lowered = to_lower_underscore(key);
            match lowered_to_schema_key.get(&lowered) {
                Some(schema_key) => {
                    renamed.insert((*schema_key).clone(), value.clone());
                }
                None => {
                    renamed.insert(key.clone(), value.clone());
                }
            }
        }
        Value::Object(renamed)
    }

    async fn offload_params(&self, params: Value) -> Result<Value, ErrorInfo> {
        let Some(store) = &self.shared_memory else {
            return Ok(params);
        };
        let Some(obj) = params.as_object() else {
            return Ok(params);
        };

        let mut out = serde_json::Map::new();
        for (key, value) in obj {
            if estimate_value_size(value) > self.param_offload_threshold {
                let bytes = serde_json::to_vec(value).map_err(|e| {
                    ErrorInfo::new(codes::LARGE_PARAM_ERROR, format!("failed to serialize param '{key}': {e}"))
                })?;
                let original_size = bytes.len();
                let id = self.fresh_reference_id();
                match store.store(&id, bytes, "application/json", &["parameter_optimization".to_string()]).await {
                    Ok(reference) => {
                        self.counters.stores.fetch_add(1, Ordering::Relaxed);
                        self.counters.bytes_stored.fetch_add(original_size as u64, Ordering::Relaxed);
                        out.insert(key.clone(), tag_reference(&reference));
                    }
                    Err(e) => {
                        return Err(ErrorInfo::new(
                            codes::LARGE_PARAM_ERROR,
                            format!("failed to offload param '{key}': {e}"),
                        ));
                    }
                }
            } else {
                out.insert(key.clone(), value.clone());
            }
        }
        Ok(Value::Object(out))
    }

    async fn deref_params(&self, params: Value) -> Result<Value, ErrorInfo> {
        let Some(store) = &self.shared_memory else {
            return Ok(params);
        };
        let Some(obj) = params.as_object() else {
            return Ok(params);
        };

        let mut out = serde_json::Map::new();
        for (key, value) in obj {
            match untag_reference(value) {
                Some(reference) => match store.get(&reference).await {
                    Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                        Ok(original) => {
                            self.counters.derefs.fetch_add(1, Ordering::Relaxed);
                            out.insert(key.clone(), original);
                        }
                        Err(e) => {
                            self.counters.deref_errors.fetch_add(1, Ordering::Relaxed);
                            return Err(ErrorInfo::new(
                                codes::DEREF_ERROR,
                                format!("failed to deserialize dereferenced param '{key}': {e}"),
                            ));
                        }
                    },
                    Err(e) => {
                        self.counters.deref_errors.fetch_add(1, Ordering::Relaxed);
                        return Err(ErrorInfo::new(codes::DEREF_ERROR, format!("failed to deref param '{key}': {e}")));
                    }
                },
                None => {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(Value::Object(out))
    }

    async fn offload_result(&self, tool_name: &str, result: &mut ToolResult) {
        let size = estimate_value_size(&result.data);
        if size <= self.result_offload_threshold {
            return;
        }

        let id = self.fresh_reference_id();

        if is_sql_result(&result.data) {
            if let Some(sql_store) = &self.sql_store {
                let tabular = parse_tabular(&result.data);
                let columns = tabular.columns.clone();
                match sql_store.store(&id, tabular).await {
                    Ok(reference) => {
                        let summary = format!(
                            "Result stored as a queryable table ({} columns). Use query_tool_result(\"{}\", \"SELECT * FROM results LIMIT 100\") to page through it, or query_tool_result(\"{}\", \"SELECT COUNT(*) FROM results\") for a row count. Columns: {}.",
                            columns.len(),
                            reference.id,
                            reference.id,
                            columns.join(", "),
                        );
                        result.data = Value::String(summary);
                        result.data_reference = Some(reference);
                        return;
                    }
                    Err(e) => {
                        result.metadata.insert("shared_memory_error".to_string(), Value::String(e.to_string()));
                        return;
                    }
                }
            }
        }

        let Some(store) = &self.shared_memory else {
            return;
        };

        let bytes = match serde_json::to_vec(&result.data) {
            Ok(bytes) => bytes,
            Err(e) => {
                result.metadata.insert("shared_memory_error".to_string(), Value::String(e.to_string()));
                return;
            }
        };

        match store.store(&id, bytes, "application/json", &[format!("tool:{tool_name}")]).await {
            Ok(reference) => match store.get_metadata(&reference).await {
                Ok(metadata) => {
                    result.data = Value::String(render_summary(&reference, &metadata));
                    result.data_reference = Some(reference);
                }
                Err(e) => {
                    result.metadata.insert("shared_memory_error".to_string(), Value::String(e.to_string()));
                }
            },
            Err(e) => {
                result.metadata.insert("shared_memory_error".to_string(), Value::String(e.to_string()));
            }
        }
    }
}

fn render_summary(reference: &DataReference, metadata: &crate::model::DataMetadata) -> String {
    let kind = match metadata.data_type {
        DataType::JsonObject => "a JSON object",
        DataType::JsonArray => "a JSON array",
        DataType::Text => "text",
        DataType::Csv => "CSV data",
    };
    format!(
        "Result is {kind} ({} bytes, ~{} tokens), stored as '{}'. Use get_tool_result(\"{}\") to retrieve it. Preview (first items): {:?}",
        metadata.size_bytes, metadata.estimated_tokens, reference.id, reference.id, metadata.preview.first5,
    )
}

fn elapsed_ms(started_at: Instant) -> i64 {
    started_at.elapsed().as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataSchema, ToolResult};
    use crate::offload::{StoreStats, TableMetadata, TabularData};
    use crate::tool::BoxFuture;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoTool {
        schema: JsonSchema,
    }

    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes params back as data"
        }
        fn input_schema(&self) -> JsonSchema {
            self.schema.clone()
        }
        fn execute(&self, _ctx: ToolContext, params: Value) -> BoxFuture<'_, Result<ToolResult, Error>> {
            Box::pin(async move { Ok(ToolResult::success(params)) })
        }
    }

    #[derive(Default)]
    struct InMemoryStore {
        blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl SharedMemoryStore for InMemoryStore {
        async fn store(&self, id: &str, bytes: Vec<u8>, _media_type: &str, _tags: &[String]) -> Result<DataReference, Error> {
            self.blobs.lock().unwrap().insert(id.to_string(), bytes);
            Ok(DataReference {
                id: id.to_string(),
                location: DataLocation::Memory,
                metadata: HashMap::new(),
            })
        }

        async fn get(&self, reference: &DataReference) -> Result<Vec<u8>, Error> {
            self.blobs
                .lock()
                .unwrap()
                .get(&reference.id)
                .cloned()
                .ok_or_else(|| Error::SharedMemory(format!("no such entry: {}", reference.id)))
        }

        async fn get_metadata(&self, reference: &DataReference) -> Result<crate::model::DataMetadata, Error> {
            let blobs = self.blobs.lock().unwrap();
            let bytes = blobs.get(&reference.id).ok_or_else(|| Error::SharedMemory("missing".to_string()))?;
            Ok(crate::model::DataMetadata {
                size_bytes: bytes.len(),
                estimated_tokens: bytes.len() / 4,
                data_type: DataType::Text,
                preview: Default::default(),
                schema: DataSchema::default(),
            })
        }

        async fn stats(&self) -> Result<StoreStats, Error> {
            Ok(StoreStats {
                item_count: self.blobs.lock().unwrap().len(),
                bytes: 0,
            })
        }
    }

    struct InMemorySqlStore {
        rows: Mutex<HashMap<String, TabularData>>,
    }

    #[async_trait]
    impl SqlResultStore for InMemorySqlStore {
        async fn store(&self, id: &str, data: TabularData) -> Result<DataReference, Error> {
            self.rows.lock().unwrap().insert(id.to_string(), data);
            Ok(DataReference {
                id: id.to_string(),
                location: DataLocation::SqlTable,
                metadata: HashMap::new(),
            })
        }

        async fn query(&self, reference: &str, sql: &str) -> Result<TabularData, Error> {
            let rows = self.rows.lock().unwrap();
            let data = rows.get(reference).ok_or_else(|| Error::SqlResult("no such table".to_string()))?;
            if sql.to_uppercase().contains("COUNT(*)") {
                return Ok(TabularData {
                    columns: vec!["count".to_string()],
                    rows: vec![vec![json!(data.rows.len())]],
                });
            }
            Ok(data.clone())
        }

        async fn get_metadata(&self, reference: &str) -> Result<TableMetadata, Error> {
            let rows = self.rows.lock().unwrap();
            let data = rows.get(reference).ok_or_else(|| Error::SqlResult("no such table".to_string()))?;
            Ok(TableMetadata {
                row_count: data.rows.len(),
                column_count: data.columns.len(),
                columns: data.columns.clone(),
            })
        }
    }

    fn schema_with(keys: &[&str]) -> JsonSchema {
        let mut properties = HashMap::new();
        for key in keys {
            properties.insert(key.to_string(), JsonSchema::default());
        }
        JsonSchema {
            r#type: Some("object".to_string()),
            properties: Some(properties),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn snake_to_schema_key_normalization() {
        let registry = Arc::new(LocalRegistry::new());
        registry.register(Arc::new(EchoTool { schema: schema_with(&["userId", "errorId"]) }));
        let executor = ExecutorBuilder::new(registry).build();

        let result = executor
            .execute(ToolContext::standalone(), "echo", json!({"user_id": "u1", "error_id": "e1"}))
            .await
            .unwrap();

        assert_eq!(result.data, json!({"userId": "u1", "errorId": "e1"}));
    }

    #[tokio::test]
    async fn unknown_param_keys_survive_verbatim() {
        let registry = Arc::new(LocalRegistry::new());
        registry.register(Arc::new(EchoTool { schema: schema_with(&["userId"]) }));
        let executor = ExecutorBuilder::new(registry).build();

        let result = executor
            .execute(ToolContext::standalone(), "echo", json!({"user_id": "u1", "totally_unknown": 1}))
            .await
            .unwrap();

        assert_eq!(result.data, json!({"userId": "u1", "totally_unknown": 1}));
    }

    #[tokio::test]
    async fn offload_round_trip_is_identity_for_large_params() {
        let registry = Arc::new(LocalRegistry::new());
        registry.register(Arc::new(EchoTool { schema: JsonSchema::object() }));
        let store = Arc::new(InMemoryStore::default());
        let executor = ExecutorBuilder::new(registry)
            .with_shared_memory(store)
            .with_param_offload_threshold(2560)
            .with_result_offload_threshold(usize::MAX)
            .build();

        let content = "x".repeat(3000);
        let result = executor
            .execute(ToolContext::standalone(), "echo", json!({"content": content.clone()}))
            .await
            .unwrap();

        assert_eq!(result.data, json!({"content": content}));
        let counters = executor.counters();
        assert_eq!(counters.stores, 1);
        assert_eq!(counters.derefs, 1);
        assert_eq!(counters.bytes_stored, 3000);
        assert_eq!(counters.deref_errors, 0);
    }

    #[tokio::test]
    async fn small_params_never_round_trip_through_store() {
        let registry = Arc::new(LocalRegistry::new());
        registry.register(Arc::new(EchoTool { schema: JsonSchema::object() }));
        let store = Arc::new(InMemoryStore::default());
        let executor = ExecutorBuilder::new(registry).with_shared_memory(store).build();

        let result = executor
            .execute(ToolContext::standalone(), "echo", json!({"content": "small"}))
            .await
            .unwrap();

        assert_eq!(result.data, json!({"content": "small"}));
        assert_eq!(executor.counters().stores, 0);
    }

    struct TabularTool;
    impl Tool for TabularTool {
        fn name(&self) -> &str {
            "big_query"
        }
        fn description(&self) -> &str {
            "returns a large tabular result"
        }
        fn input_schema(&self) -> JsonSchema {
            JsonSchema::object()
        }
        fn execute(&self, _ctx: ToolContext, _params: Value) -> BoxFuture<'_, Result<ToolResult, Error>> {
            Box::pin(async move {
                let rows: Vec<Value> = (0..20_000).map(|i| json!([i, i * 2])).collect();
                Ok(ToolResult::success(json!({"columns": ["a", "b"], "rows": rows})))
            })
        }
    }

    #[tokio::test]
    async fn sql_result_routing_stores_tabular_data() {
        let registry = Arc::new(LocalRegistry::new());
        registry.register(Arc::new(TabularTool));
        let sql_store = Arc::new(InMemorySqlStore { rows: Mutex::new(HashMap::new()) });
        let executor = ExecutorBuilder::new(registry)
            .with_sql_store(sql_store.clone())
            .with_result_offload_threshold(2560)
            .build();

        let result = executor.execute(ToolContext::standalone(), "big_query", json!({})).await.unwrap();

        assert!(result.data.as_str().unwrap().contains("query_tool_result("));
        let reference = result.data_reference.unwrap();
        let counted = sql_store.query(&reference.id, "SELECT COUNT(*) FROM results").await.unwrap();
        assert_eq!(counted.rows[0][0], json!(20_000));
    }

    #[tokio::test]
    async fn missing_tool_is_a_transport_error_naming_the_tool() {
        let registry = Arc::new(LocalRegistry::new());
        let executor = ExecutorBuilder::new(registry).build();
        let err = executor.execute(ToolContext::standalone(), "nope", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("tool not found: nope"));
    }

    #[tokio::test]
    async fn permission_denial_skips_execution() {
        let registry = Arc::new(LocalRegistry::new());
        registry.register(Arc::new(EchoTool { schema: JsonSchema::object() }));
        let mut policy = PermissionPolicy::default();
        policy.default_action = crate::permission::DefaultAction::Deny;
        let executor = ExecutorBuilder::new(registry).with_permission(policy).build();

        let result = executor.execute(ToolContext::standalone(), "echo", json!({"a": 1})).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.unwrap().code, codes::PERMISSION_DENIED);
    }
}
