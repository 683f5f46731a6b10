//! Shared data model: schemas, results, data references and error records.
//!
//! These types cross every component boundary in this crate, so they live
//! in one module rather than alongside any single subsystem.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recursive JSON-Schema-shaped record used for tool parameter schemas.
///
/// Mirrors the subset of JSON Schema that LLM tool-calling providers
/// actually consume: object/array/scalar types, nested `properties`,
/// an ordered `required` list, and the handful of scalar constraints
/// providers commonly pass through.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JsonSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, JsonSchema>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "minLength")]
    pub min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "maxLength")]
    pub max_length: Option<u64>,
}

impl JsonSchema {
    pub fn object() -> Self {
        Self {
            r#type: Some("object".to_string()),
            properties: Some(HashMap::new()),
            ..Default::default()
        }
    }
}

/// Walks a schema tree and fixes it up for downstream LLM providers that
/// reject a null `properties` field on an object node.
///
/// - object nodes get a non-null (possibly empty) `properties` map
/// - a missing `type` is inferred from structure: `properties` present
///   implies `object`, `items` present implies `array`, an `enum` with no
///   other hint implies `string`
/// - `properties` and `items` are normalized recursively
///
/// Idempotent: normalizing an already-normalized schema is a no-op.
pub fn normalize_schema(schema: &JsonSchema) -> JsonSchema {
    let mut out = schema.clone();

    if out.r#type.is_none() {
        if out.properties.is_some() {
            out.r#type = Some("object".to_string());
        } else if out.items.is_some() {
            out.r#type = Some("array".to_string());
        } else if out.r#enum.is_some() {
            out.r#type = Some("string".to_string());
        }
    }

    if out.r#type.as_deref() == Some("object") {
        let props = out.properties.take().unwrap_or_default();
        out.properties = Some(
            props
                .into_iter()
                .map(|(k, v)| (k, normalize_schema(&v)))
                .collect(),
        );
    } else if let Some(props) = out.properties.take() {
        out.properties = Some(
            props
                .into_iter()
                .map(|(k, v)| (k, normalize_schema(&v)))
                .collect(),
        );
    }

    if let Some(items) = out.items.take() {
        out.items = Some(Box::new(normalize_schema(&items)));
    }

    out
}

/// Opaque handle into side storage (shared memory or SQL result store).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataReference {
    pub id: String,
    pub location: DataLocation,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataLocation {
    Memory,
    SqlTable,
    Other(String),
}

/// Detected shape of a stored payload, used to pick preview/summary
/// rendering and retrieval hints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    JsonObject,
    JsonArray,
    Text,
    Csv,
}

/// Preview window kept alongside a stored entry: the first and last few
/// items of a sequence, or the top-level field shapes of an object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataPreview {
    pub first5: Vec<Value>,
    pub last5: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub r#type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataSchema {
    pub fields: Vec<SchemaField>,
    pub item_count: usize,
}

/// Metadata recorded alongside a side-storage entry at store time. This is
/// what the executor reads back to build the inline summary that replaces
/// the raw payload in a `ToolResult`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataMetadata {
    pub size_bytes: usize,
    pub estimated_tokens: usize,
    pub data_type: DataType,
    pub preview: DataPreview,
    pub schema: DataSchema,
}

/// The semantic error record carried on `ToolResult.error`. Distinct from
/// [`crate::error::Error`], which is the transport-level channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: HashMap<String, Value>,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: HashMap::new(),
            retryable: false,
            suggestion: None,
        }
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// The outcome of a single tool invocation as seen by callers of the
/// executor. `success = false` always implies `error.is_some()`; a set
/// `data_reference` always implies `data` is a human-readable summary
/// string, never the raw payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub execution_time_ms: i64,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_reference: Option<DataReference>,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: HashMap::new(),
            execution_time_ms: 0,
            cache_hit: false,
            data_reference: None,
        }
    }

    pub fn failure(error: ErrorInfo) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error),
            metadata: HashMap::new(),
            execution_time_ms: 0,
            cache_hit: false,
            data_reference: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_execution_time_ms(mut self, ms: i64) -> Self {
        self.execution_time_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_fills_empty_properties() {
        let schema = JsonSchema {
            r#type: Some("object".to_string()),
            properties: None,
            ..Default::default()
        };
        let normalized = normalize_schema(&schema);
        assert_eq!(normalized.properties, Some(HashMap::new()));
    }

    #[test]
    fn normalize_infers_object_from_properties() {
        let mut props = HashMap::new();
        props.insert("user_id".to_string(), JsonSchema::default());
        let schema = JsonSchema {
            properties: Some(props),
            ..Default::default()
        };
        let normalized = normalize_schema(&schema);
        assert_eq!(normalized.r#type.as_deref(), Some("object"));
    }

    #[test]
    fn normalize_infers_array_from_items() {
        let schema = JsonSchema {
            items: Some(Box::new(JsonSchema::default())),
            ..Default::default()
        };
        let normalized = normalize_schema(&schema);
        assert_eq!(normalized.r#type.as_deref(), Some("array"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut props = HashMap::new();
        props.insert("id".to_string(), JsonSchema::default());
        let schema = JsonSchema {
            properties: Some(props),
            ..Default::default()
        };
        let once = normalize_schema(&schema);
        let twice = normalize_schema(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn result_failure_requires_no_explicit_success_flag() {
        let result = ToolResult::failure(ErrorInfo::new("execution_failed", "boom"));
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
