//! Permission Checker (C6): the whitelist/blacklist/approval policy
//! evaluated before a tool actually executes, as a six-level precedence
//! chain (YOLO mode, disabled, allowed, require_approval, default action,
//! approval callback).

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;

use crate::error::codes;
use crate::model::ErrorInfo;

/// What happens when none of the explicit rules (YOLO, disabled, allowed,
/// require_approval) settle the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultAction {
    #[default]
    Allow,
    Deny,
}

impl FromStr for DefaultAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow" => Ok(DefaultAction::Allow),
            "deny" => Ok(DefaultAction::Deny),
            _ => Err(format!("unknown default action: {s} (expected allow or deny)")),
        }
    }
}

/// Extension point for case 6 of the precedence chain: when no rule
/// settles the question and the default action is `deny`, an installed
/// callback gets a last chance to approve the call. If unimplemented, the
/// default action is authoritative.
pub trait ApprovalCallback: Send + Sync {
    fn approve(&self, tool_name: &str, params: &Value) -> bool;
}

pub enum Decision {
    Allow,
    Deny(ErrorInfo),
}

/// Evaluated before execution. Precedence, highest first:
/// 1. YOLO mode -> always allow
/// 2. tool name in the disabled set -> deny
/// 3. tool name in the allowed set -> allow
/// 4. `require_approval == false` -> allow
/// 5. `default_action == Allow` -> allow
/// 6. otherwise -> consult the approval callback, else deny
pub struct PermissionPolicy {
    pub yolo_mode: bool,
    pub disabled: HashSet<String>,
    pub allowed: HashSet<String>,
    pub require_approval: bool,
    pub default_action: DefaultAction,
    pub approval_callback: Option<Arc<dyn ApprovalCallback>>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self {
            yolo_mode: false,
            disabled: HashSet::new(),
            allowed: HashSet::new(),
            require_approval: true,
            default_action: DefaultAction::Allow,
            approval_callback: None,
        }
    }
}

impl PermissionPolicy {
    pub fn yolo() -> Self {
        Self {
            yolo_mode: true,
            ..Default::default()
        }
    }

    pub fn with_disabled(mut self, tool_name: impl Into<String>) -> Self {
        self.disabled.insert(tool_name.into());
        self
    }

    pub fn with_allowed(mut self, tool_name: impl Into<String>) -> Self {
        self.allowed.insert(tool_name.into());
        self
    }

    pub fn with_approval_callback(mut self, callback: Arc<dyn ApprovalCallback>) -> Self {
        self.approval_callback = Some(callback);
        self
    }

    pub fn check(&self, tool_name: &str, params: &Value) -> Decision {
        if self.yolo_mode {
            return Decision::Allow;
        }

        if self.disabled.contains(tool_name) {
            return Decision::Deny(denied(tool_name));
        }

        if self.allowed.contains(tool_name) {
            return Decision::Allow;
        }

        if !self.require_approval {
            return Decision::Allow;
        }

        if self.default_action == DefaultAction::Allow {
            return Decision::Allow;
        }

        if let Some(callback) = &self.approval_callback {
            if callback.approve(tool_name, params) {
                return Decision::Allow;
            }
        }

        Decision::Deny(denied(tool_name))
    }
}

fn denied(tool_name: &str) -> ErrorInfo {
    ErrorInfo::new(
        codes::PERMISSION_DENIED,
        format!(
            "execution of '{tool_name}' requires approval; add it to the allowed set or enable yolo mode to bypass"
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yolo_allows_everything() {
        let policy = PermissionPolicy::yolo().with_disabled("Bash");
        assert!(matches!(policy.check("Bash", &json!({})), Decision::Allow));
    }

    #[test]
    fn disabled_set_wins_over_allowed_set() {
        let mut policy = PermissionPolicy::default().with_allowed("Bash").with_disabled("Bash");
        policy.require_approval = false;
        assert!(matches!(policy.check("Bash", &json!({})), Decision::Deny(_)));
    }

    #[test]
    fn default_allow_bypasses_approval() {
        let policy = PermissionPolicy::default();
        assert!(matches!(policy.check("AnyTool", &json!({})), Decision::Allow));
    }

    #[test]
    fn default_deny_without_callback_denies() {
        let mut policy = PermissionPolicy::default();
        policy.default_action = DefaultAction::Deny;
        match policy.check("Write", &json!({})) {
            Decision::Deny(err) => assert_eq!(err.code, codes::PERMISSION_DENIED),
            Decision::Allow => panic!("expected denial"),
        }
    }

    struct AlwaysApprove;
    impl ApprovalCallback for AlwaysApprove {
        fn approve(&self, _tool_name: &str, _params: &Value) -> bool {
            true
        }
    }

    #[test]
    fn approval_callback_can_rescue_default_deny() {
        let mut policy = PermissionPolicy::default().with_approval_callback(Arc::new(AlwaysApprove));
        policy.default_action = DefaultAction::Deny;
        assert!(matches!(policy.check("Write", &json!({})), Decision::Allow));
    }
}
