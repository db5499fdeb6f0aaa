use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ─── ImpactLevel ─────────────────────────────────────────────────────────────

/// Severity tag controlling whether an action is auto-approved or queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl ImpactLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// High and critical actions always need a human in the loop.
    pub fn requires_approval(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── ApprovalStatus ──────────────────────────────────────────────────────────

/// Lifecycle of an approval request.  `Pending` is the only non-terminal
/// state; terminal states absorb further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── ApprovalRequest ─────────────────────────────────────────────────────────

/// A single human-in-the-loop approval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub agent_id: String,
    pub action_type: String,
    pub action_data: Value,
    pub impact_level: ImpactLevel,
    pub reason: String,
    pub status: ApprovalStatus,
    /// Who resolved the request (`"system"` for auto-approvals).
    pub resolver: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub timeout_seconds: u64,
}

impl ApprovalRequest {
    pub fn new(
        agent_id: impl Into<String>,
        action_type: impl Into<String>,
        action_data: Value,
        impact_level: ImpactLevel,
        reason: impl Into<String>,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            agent_id: agent_id.into(),
            action_type: action_type.into(),
            action_data,
            impact_level,
            reason: reason.into(),
            status: ApprovalStatus::Pending,
            resolver: None,
            resolved_at: None,
            timeout_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impact_round_trips_through_strings() {
        for level in [
            ImpactLevel::Low,
            ImpactLevel::Medium,
            ImpactLevel::High,
            ImpactLevel::Critical,
        ] {
            assert_eq!(ImpactLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(ImpactLevel::parse("severe"), None);
    }

    #[test]
    fn only_high_and_critical_require_approval() {
        assert!(!ImpactLevel::Low.requires_approval());
        assert!(!ImpactLevel::Medium.requires_approval());
        assert!(ImpactLevel::High.requires_approval());
        assert!(ImpactLevel::Critical.requires_approval());
    }

    #[test]
    fn pending_is_the_only_non_terminal_status() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::Rejected.is_terminal());
        assert!(ApprovalStatus::Expired.is_terminal());
    }

    #[test]
    fn new_request_starts_pending_with_unique_id() {
        let a = ApprovalRequest::new(
            "security",
            "unlock_door",
            serde_json::json!({"entity_id": "lock.front"}),
            ImpactLevel::High,
            "agent requested unlock",
            300,
        );
        let b = ApprovalRequest::new(
            "security",
            "unlock_door",
            serde_json::json!({}),
            ImpactLevel::High,
            "again",
            300,
        );
        assert_eq!(a.status, ApprovalStatus::Pending);
        assert!(a.resolver.is_none());
        assert_ne!(a.id, b.id);
    }
}
