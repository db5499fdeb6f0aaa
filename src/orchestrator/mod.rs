pub mod chat;
pub mod conflicts;
pub mod ledger;
pub mod pipeline;

pub use chat::ChatOutcome;
pub use conflicts::Conflict;
pub use ledger::{ProgressLedger, Task, TaskLedger, TaskPriority};
pub use pipeline::{Orchestrator, OrchestratorState};
