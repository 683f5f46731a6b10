//! The Tool contract (C1): the minimal interface every tool implements.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::error::Error;
use crate::model::{JsonSchema, ToolResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-call context threaded through `Tool::execute`.
///
/// Carries a cooperative cancellation flag (observed by long-running tools
/// and by the HITL wait loop) and an optional channel a tool can use to
/// raise an approval question through the installed approval extension
/// point. Tools are expected to check `is_cancelled()` at their own
/// suspension points; the executor does not forcibly interrupt a running
/// tool.
#[derive(Clone)]
pub struct ToolContext {
    cancelled: Arc<AtomicBool>,
    pub tool_call_id: String,
}

impl ToolContext {
    pub fn new(tool_call_id: impl Into<String>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            tool_call_id: tool_call_id.into(),
        }
    }

    /// A context with no identity, useful for tests and standalone calls.
    pub fn standalone() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

/// A unit of work runnable by the executor.
///
/// `execute` must not panic. Failures that are part of the tool's own
/// semantics (a bad argument, an upstream 404) are reported by returning
/// `Ok(ToolResult::failure(..))`; failures that mean the call never really
/// happened (transport breakage, a broken pipe) are reported as `Err`.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> JsonSchema;

    /// Opaque backend tag. Empty means backend-agnostic.
    fn backend(&self) -> &str {
        ""
    }

    fn execute(&self, ctx: ToolContext, params: Value) -> BoxFuture<'_, Result<ToolResult, Error>>;
}

pub type ToolRef = Arc<dyn Tool>;
