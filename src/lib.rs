pub mod agent;
pub mod approval;
pub mod bus;
pub mod config;
pub mod decision_log;
pub mod error;
pub mod event_bus;
pub mod orchestrator;
pub mod provider;
pub mod runtime;
pub mod tools;

/// Convenience re-exports for the most commonly used traits and types across
/// the hearthd codebase.
///
/// ```rust
/// use hearthd::prelude::*;
/// ```
pub mod prelude {
    // Provider trait
    pub use crate::provider::{ChatMessage, ChatProvider, ChatRequest, ChatResponse, Role};

    // Tool system
    pub use crate::tools::{SafetyConfig, Tool, ToolRegistry};

    // Approval queue
    pub use crate::approval::{ApprovalQueue, ApprovalRequest, ApprovalStatus, ImpactLevel};

    // Device bus
    pub use crate::bus::{BusHandle, EntityState, HaClient};

    // Agent runtime
    pub use crate::agent::{AgentRegistry, AgentSpec, AgentStatus, Decision};

    // Event bus
    pub use crate::event_bus::{AppEvent, EventBroadcaster};

    // Configuration
    pub use crate::config::{load_default_config, AgentConfigStore, AppConfig};

    // Runtime wiring
    pub use crate::runtime::Runtime;

    // Errors
    pub use crate::error::{BusError, Error, ProviderError, ToolError};
}
