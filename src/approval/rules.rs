//! Auto-approval rules, keyed by agent id.
//!
//! Evaluated once at request creation.  A request that no rule approves
//! stays pending and waits for a human (or the timeout watcher).

use serde_json::Value;

use super::types::{ApprovalRequest, ImpactLevel};

/// Outcome of evaluating the rule set against a new request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleDecision {
    /// Resolve immediately as approved, resolver `"system"`.
    Approve,
    /// Leave pending for a human.
    Pending,
}

/// The rule matrix.
///
/// | agent      | rule |
/// |------------|------|
/// | lighting   | approve everything |
/// | heating / cooling | approve when the set-point delta is within `max_change_celsius` and the requested mode (if any) is allowed |
/// | security   | approve only action types in the explicit allowlist |
/// | any        | high/critical → always pending; low → approve; medium → pending |
#[derive(Debug, Clone)]
pub struct AutoApprovalRules {
    /// Maximum auto-approved temperature delta for HVAC agents (°C).
    pub max_change_celsius: f64,
    /// HVAC modes that may be auto-approved.
    pub allowed_hvac_modes: Vec<String>,
    /// Security action types that are safe to auto-approve.
    pub security_auto_approve: Vec<String>,
}

impl Default for AutoApprovalRules {
    fn default() -> Self {
        Self {
            max_change_celsius: 2.0,
            allowed_hvac_modes: vec!["heat".to_string(), "cool".to_string(), "auto".to_string()],
            security_auto_approve: vec!["armed_home_to_armed_away".to_string()],
        }
    }
}

impl AutoApprovalRules {
    /// Evaluate the rule set.  First match wins; high/critical impact is
    /// checked before the low-impact default so an escalated request can
    /// never slip through on impact alone.
    pub fn evaluate(&self, request: &ApprovalRequest) -> RuleDecision {
        match request.agent_id.as_str() {
            "lighting" => return RuleDecision::Approve,
            "heating" | "cooling" => {
                if self.hvac_within_limits(&request.action_data) {
                    return RuleDecision::Approve;
                }
            }
            "security" => {
                if self
                    .security_auto_approve
                    .iter()
                    .any(|t| t == &request.action_type)
                {
                    return RuleDecision::Approve;
                }
            }
            _ => {}
        }

        if request.impact_level.requires_approval() {
            return RuleDecision::Pending;
        }

        if request.impact_level == ImpactLevel::Low {
            RuleDecision::Approve
        } else {
            RuleDecision::Pending
        }
    }

    fn hvac_within_limits(&self, action_data: &Value) -> bool {
        let Some(change) = action_data
            .get("temperature_change")
            .and_then(Value::as_f64)
        else {
            return false;
        };
        if change.abs() > self.max_change_celsius {
            return false;
        }
        // A requested mode outside the allowed set blocks auto-approval.
        match action_data.get("hvac_mode").and_then(Value::as_str) {
            Some(mode) => self.allowed_hvac_modes.iter().any(|m| m == mode),
            None => true,
        }
    }
}
