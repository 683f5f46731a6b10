//! Instrumented wrapper (C9): a transparent `tracing` decorator around the
//! executor. Opens one span per call, records parameters and metadata up
//! to a size cap, and emits start/completion/error events.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{field, info_span, Instrument};

use crate::error::Error;
use crate::executor::Executor;
use crate::model::ToolResult;
use crate::tool::{Tool, ToolContext};

/// Parameter serializations at or above this size are recorded only as a
/// count in the span, never verbatim.
const MAX_LOGGED_PARAM_BYTES: usize = 1000;

pub struct InstrumentedExecutor {
    inner: Arc<Executor>,
}

impl InstrumentedExecutor {
    pub fn new(inner: Arc<Executor>) -> Self {
        Self { inner }
    }

    pub async fn execute(&self, ctx: ToolContext, tool_name: &str, params: Value) -> Result<ToolResult, Error> {
        let tool = match self.inner.registry().get(tool_name) {
            Some(tool) => tool,
            None => {
                return self.inner.execute(ctx, tool_name, params).await;
            }
        };
        self.execute_with_tool(ctx, tool, params).await
    }

    pub async fn execute_with_tool(
        &self,
        ctx: ToolContext,
        tool: Arc<dyn Tool>,
        params: Value,
    ) -> Result<ToolResult, Error> {
        let params_repr = describe_params(&params);
        let span = info_span!(
            "tool.execute",
            tool.name = tool.name(),
            tool.backend = tool.backend(),
            tool.description = tool.description(),
            tool.params = field::Empty,
            tool.param_count = field::Empty,
            tool.metadata = field::Empty,
        );
        match params_repr {
            ParamsRepr::Serialized(s) => span.record("tool.params", s.as_str()),
            ParamsRepr::Count(n) => span.record("tool.param_count", n),
        };

        async {
            tracing::event!(tracing::Level::INFO, "tool.execution.started");
            let started_at = Instant::now();
            let outcome = self.inner.execute_with_tool(ctx, tool, params).await;
            let duration_ms = started_at.elapsed().as_millis() as u64;

            match &outcome {
                Ok(result) if result.success => {
                    record_metadata(&span, &result.metadata);
                    tracing::event!(
                        tracing::Level::INFO,
                        "tool.execution.completed",
                        cache_hit = result.cache_hit,
                        duration_ms,
                    );
                }
                Ok(result) => {
                    let error = result.error.as_ref();
                    tracing::event!(
                        tracing::Level::WARN,
                        "tool.execution.error",
                        error_code = error.map(|e| e.code.as_str()).unwrap_or("unknown"),
                        retryable = error.map(|e| e.retryable).unwrap_or(false),
                    );
                }
                Err(err) => {
                    tracing::event!(tracing::Level::ERROR, "tool.execution.failed", error = %err);
                }
            }

            outcome
        }
        .instrument(span)
        .await
    }
}

enum ParamsRepr {
    Serialized(String),
    Count(usize),
}

fn describe_params(params: &Value) -> ParamsRepr {
    match serde_json::to_string(params) {
        Ok(s) if s.len() < MAX_LOGGED_PARAM_BYTES => ParamsRepr::Serialized(s),
        Ok(_) => ParamsRepr::Count(params.as_object().map(|o| o.len()).unwrap_or(0)),
        Err(_) => ParamsRepr::Count(0),
    }
}

/// Scalar metadata values (string/number/bool) are recorded on the span as
/// `tool.metadata`, a small JSON object keyed the same as the result's own
/// metadata map; nested structures are dropped and only counted, since
/// tracing spans can't carry arbitrarily-shaped values.
fn record_metadata(span: &tracing::Span, metadata: &std::collections::HashMap<String, Value>) {
    let mut scalars = serde_json::Map::new();
    let mut nested = 0usize;
    for (key, value) in metadata {
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                scalars.insert(key.clone(), value.clone());
            }
            _ => nested += 1,
        }
    }
    if !scalars.is_empty() {
        span.record("tool.metadata", field::display(Value::Object(scalars)));
    }
    if nested > 0 {
        tracing::event!(tracing::Level::DEBUG, nested_metadata_count = nested, "tool.metadata.nested_omitted");
    }
}
