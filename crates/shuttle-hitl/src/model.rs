//! Data model for a human-in-the-loop request (C10 entity).

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    Approval,
    Decision,
    Input,
    Review,
}

impl Default for RequestType {
    fn default() -> Self {
        RequestType::Input
    }
}

impl FromStr for RequestType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approval" => Ok(RequestType::Approval),
            "decision" => Ok(RequestType::Decision),
            "input" => Ok(RequestType::Input),
            "review" => Ok(RequestType::Review),
            _ => Err(format!("unknown request type: {s}")),
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestType::Approval => "approval",
            RequestType::Decision => "decision",
            RequestType::Input => "input",
            RequestType::Review => "review",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(format!("unknown priority: {s}")),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle: created `Pending`, transitions to exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Responded,
    Timeout,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Responded => "responded",
            RequestStatus::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// A single human-in-the-loop request, from creation through its terminal
/// response (or timeout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanRequest {
    pub id: String,
    pub agent_id: String,
    pub session_id: String,
    pub question: String,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    pub request_type: RequestType,
    pub priority: Priority,
    pub timeout_ms: i64,
    /// Unix-millis.
    pub created_at: i64,
    /// Unix-millis.
    pub expires_at: i64,
    pub status: RequestStatus,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub response_data: HashMap<String, Value>,
    #[serde(default)]
    pub responded_at: Option<i64>,
    #[serde(default)]
    pub responded_by: Option<String>,
}

impl HumanRequest {
    pub fn new(
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        question: impl Into<String>,
        request_type: RequestType,
        priority: Priority,
        timeout_ms: i64,
        now_ms: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            question: question.into(),
            context: HashMap::new(),
            request_type,
            priority,
            timeout_ms,
            created_at: now_ms,
            expires_at: now_ms + timeout_ms,
            status: RequestStatus::Pending,
            response: String::new(),
            response_data: HashMap::new(),
            responded_at: None,
            responded_by: None,
        }
    }
}
