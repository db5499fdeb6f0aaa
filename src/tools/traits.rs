use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;

/// A capability an agent can invoke.
///
/// Implementations must be `Send + Sync` so they can be held in a shared
/// `Arc<dyn Tool>` registry.  Argument validation against
/// [`parameters_schema`] is performed by the registry before `execute` runs.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable machine identifier (snake_case), e.g. `"set_temperature"`.
    fn name(&self) -> &str;

    /// Human-readable description included in agent prompts.
    fn description(&self) -> &str;

    /// JSON Schema object describing the tool's accepted parameters.
    fn parameters_schema(&self) -> Value;

    /// Whether executing this tool mutates external state.  Read-only tools
    /// ignore the registry's dry-run flag.
    fn mutating(&self) -> bool {
        true
    }

    /// Execute with validated arguments.  The returned value is the tool
    /// result payload; errors are folded into the result by the registry.
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Summary of a registered tool, suitable for inclusion in prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub schema: Value,
}
