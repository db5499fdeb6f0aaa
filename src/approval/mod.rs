pub mod queue;
pub mod rules;
pub mod store;
pub mod types;

pub use queue::{ApprovalCallback, ApprovalQueue};
pub use rules::{AutoApprovalRules, RuleDecision};
pub use store::ApprovalStore;
pub use types::{ApprovalRequest, ApprovalStatus, ImpactLevel};
