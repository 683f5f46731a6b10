//! `contact_human`: the tool surface over the human request store. Creates
//! a request, fires a best-effort notification, then polls the store until
//! the request leaves `pending` or its deadline passes.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use shuttle_core::error::{codes, Error};
use shuttle_core::model::{ErrorInfo, JsonSchema, ToolResult};
use shuttle_core::tool::{BoxFuture, Tool, ToolContext};

use crate::model::{HumanRequest, Priority, RequestStatus, RequestType};
use crate::notifier::Notifier;
use crate::store::HumanRequestStore;

const DEFAULT_TIMEOUT_SECS: i64 = 300;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Supplies the current time in unix-millis. A trait rather than a bare
/// `fn` pointer so tests can substitute a stepped clock without a process
/// clock dependency.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

pub struct ContactHumanTool {
    agent_id: String,
    store: Arc<dyn HumanRequestStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    poll_interval_ms: u64,
}

impl ContactHumanTool {
    pub fn new(agent_id: impl Into<String>, store: Arc<dyn HumanRequestStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            agent_id: agent_id.into(),
            store,
            notifier,
            clock: Arc::new(SystemClock),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    /// Overrides the clock and poll interval, for deterministic tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>, poll_interval_ms: u64) -> Self {
        self.clock = clock;
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    fn schema() -> JsonSchema {
        let mut properties = HashMap::new();
        properties.insert(
            "question".to_string(),
            JsonSchema { r#type: Some("string".to_string()), ..Default::default() },
        );
        properties.insert(
            "request_type".to_string(),
            JsonSchema {
                r#type: Some("string".to_string()),
                r#enum: Some(vec![json!("approval"), json!("decision"), json!("input"), json!("review")]),
                default: Some(json!("input")),
                ..Default::default()
            },
        );
        properties.insert(
            "priority".to_string(),
            JsonSchema {
                r#type: Some("string".to_string()),
                r#enum: Some(vec![json!("low"), json!("normal"), json!("high"), json!("critical")]),
                default: Some(json!("normal")),
                ..Default::default()
            },
        );
        properties.insert(
            "context".to_string(),
            JsonSchema { r#type: Some("object".to_string()), properties: Some(HashMap::new()), ..Default::default() },
        );
        properties.insert(
            "timeout_seconds".to_string(),
            JsonSchema { r#type: Some("number".to_string()), default: Some(json!(DEFAULT_TIMEOUT_SECS)), ..Default::default() },
        );

        JsonSchema {
            r#type: Some("object".to_string()),
            properties: Some(properties),
            required: vec!["question".to_string()],
            ..Default::default()
        }
    }

    async fn run(&self, ctx: ToolContext, params: Value) -> Result<ToolResult, Error> {
        let question = params
            .get("question")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Resolver("contact_human requires a 'question' parameter".to_string()))?
            .to_string();

        let request_type: RequestType = params
            .get("request_type")
            .and_then(Value::as_str)
            .map(str::parse)
            .transpose()
            .map_err(Error::Resolver)?
            .unwrap_or_default();

        let priority: Priority = params
            .get("priority")
            .and_then(Value::as_str)
            .map(str::parse)
            .transpose()
            .map_err(Error::Resolver)?
            .unwrap_or_default();

        let timeout_secs = params.get("timeout_seconds").and_then(Value::as_i64).unwrap_or(DEFAULT_TIMEOUT_SECS);
        let timeout_ms = timeout_secs.max(1) * 1000;

        let context: HashMap<String, Value> = params
            .get("context")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let now_ms = self.clock.now_ms();
        let mut request = HumanRequest::new(&self.agent_id, &ctx.tool_call_id, question, request_type, priority, timeout_ms, now_ms);
        request.context = context;

        self.store.store(request.clone()).await?;
        self.notifier.notify(&request).await;

        loop {
            if ctx.is_cancelled() {
                return Ok(timeout_result(&request.id, "cancelled before a human responded"));
            }

            let now = self.clock.now_ms();
            if now >= request.expires_at {
                let _ = self
                    .store
                    .respond(&request.id, RequestStatus::Timeout, String::new(), "system".to_string(), HashMap::new())
                    .await;
                return Ok(timeout_result(&request.id, "timed out waiting for a human response"));
            }

            match self.store.get(&request.id).await {
                Ok(Some(current)) if current.status.is_terminal() => {
                    return Ok(ToolResult::success(json!({
                        "request_id": current.id,
                        "status": current.status.to_string(),
                        "response": current.response,
                        "response_data": current.response_data,
                        "responded_by": current.responded_by,
                        "responded_at": current.responded_at,
                    })));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(request_id = %request.id, error = %e, "transient error polling human request, retrying");
                }
            }

            tokio::time::sleep(std::time::Duration::from_millis(self.poll_interval_ms)).await;
        }
    }
}

fn timeout_result(request_id: &str, message: &str) -> ToolResult {
    ToolResult::failure(
        ErrorInfo::new(codes::TIMEOUT, message).retryable().with_detail("request_id", json!(request_id)),
    )
    .with_metadata("request_id", json!(request_id))
}

impl Tool for ContactHumanTool {
    fn name(&self) -> &str {
        "contact_human"
    }

    fn description(&self) -> &str {
        "Asks a human for approval, a decision, input, or a review, and waits for their response."
    }

    fn input_schema(&self) -> JsonSchema {
        Self::schema()
    }

    fn execute(&self, ctx: ToolContext, params: Value) -> BoxFuture<'_, Result<ToolResult, Error>> {
        Box::pin(self.run(ctx, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NoopNotifier;
    use crate::store::InMemoryHumanRequestStore;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct SteppedClock {
        now: AtomicI64,
        step_ms: i64,
    }

    impl Clock for SteppedClock {
        fn now_ms(&self) -> i64 {
            self.now.fetch_add(self.step_ms, Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn times_out_when_deadline_passes() {
        let store: Arc<dyn HumanRequestStore> = Arc::new(InMemoryHumanRequestStore::new());
        let notifier: Arc<dyn Notifier> = Arc::new(NoopNotifier);
        let clock = Arc::new(SteppedClock { now: AtomicI64::new(0), step_ms: 2_000 });
        let tool = ContactHumanTool::new("agent-1", store, notifier).with_clock(clock, 1);

        let ctx = ToolContext::standalone();
        let result = tool.execute(ctx, json!({"question": "deploy?", "timeout_seconds": 1})).await.unwrap();

        assert!(!result.success);
        assert!(result.metadata.get("request_id").is_some());
        assert_eq!(result.error.unwrap().code, codes::TIMEOUT);
    }

    #[tokio::test]
    async fn returns_success_once_a_human_responds() {
        let store: Arc<dyn HumanRequestStore> = Arc::new(InMemoryHumanRequestStore::new());
        let notifier: Arc<dyn Notifier> = Arc::new(NoopNotifier);
        let tool = ContactHumanTool::new("agent-1", store.clone(), notifier);

        let ctx = ToolContext::standalone();
        let responder = {
            let store = store.clone();
            tokio::spawn(async move {
                loop {
                    let pending = store.list_pending().await.unwrap();
                    if let Some(request) = pending.into_iter().next() {
                        store
                            .respond(&request.id, RequestStatus::Approved, "go ahead".to_string(), "alice".to_string(), HashMap::new())
                            .await
                            .unwrap();
                        break;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                }
            })
        };

        let result = tool.execute(ctx, json!({"question": "deploy?", "timeout_seconds": 30})).await.unwrap();
        responder.await.unwrap();

        assert!(result.success);
        assert_eq!(result.data["status"], json!("approved"));
        assert_eq!(result.data["response"], json!("go ahead"));
    }

    #[tokio::test]
    async fn missing_question_is_rejected() {
        let store: Arc<dyn HumanRequestStore> = Arc::new(InMemoryHumanRequestStore::new());
        let notifier: Arc<dyn Notifier> = Arc::new(NoopNotifier);
        let tool = ContactHumanTool::new("agent-1", store, notifier);
        let err = tool.execute(ToolContext::standalone(), json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Resolver(_)));
    }
}
