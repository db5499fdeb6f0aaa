//! Crate-wide error taxonomy.
//!
//! Each subsystem carries its own `thiserror` enum; [`Error`] unifies them at
//! the runtime boundary.  The agent and orchestrator loops never propagate
//! these out of their tasks — every loop body catches, broadcasts an error
//! status, backs off, and resumes.

use thiserror::Error;

// ─── BusError ─────────────────────────────────────────────────────────────────

/// Failures talking to the device bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The peer rejected our access token.  Fatal at startup; never retried.
    #[error("device bus authentication failed: {0}")]
    AuthFailed(String),

    /// The session is not (or no longer) connected.  Transient: the calling
    /// cycle fails and the next tick retries.
    #[error("device bus is not connected")]
    Disconnected,

    /// No response frame arrived within the caller-supplied deadline.
    #[error("timed out after {0}s waiting for device bus response")]
    Timeout(u64),

    /// The peer answered with `success: false`.
    #[error("device bus command failed: {0}")]
    CommandFailed(String),

    /// A frame that does not fit the expected protocol shape.
    #[error("device bus protocol error: {0}")]
    Protocol(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}

// ─── ProviderError ────────────────────────────────────────────────────────────

/// Failures calling a language-model provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("provider response carried no content")]
    EmptyResponse,
}

// ─── ToolError ────────────────────────────────────────────────────────────────

/// Failures inside the tool layer.  These are reported in the tool result
/// value (never raised out of the registry) and logged; the calling agent
/// treats the action as a no-op and continues.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The universal tool refused a blocked domain.
    #[error("access to domain '{0}' is blocked for security reasons")]
    Blocked(String),

    /// The universal tool refused a domain outside the allowlist.
    #[error("domain '{0}' is not in the allowed list of safe domains")]
    NotAllowed(String),

    #[error("approval queue error: {0}")]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

// ─── ApprovalError ────────────────────────────────────────────────────────────

/// Failures in the approval queue's persistence layer.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("approval payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

// ─── ConfigError ──────────────────────────────────────────────────────────────

/// Failures loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// Saving an agent whose id already exists in the agents file.
    #[error("agent id '{0}' already exists")]
    DuplicateAgent(String),

    #[error("agent id '{0}' not found")]
    UnknownAgent(String),
}

// ─── Error ────────────────────────────────────────────────────────────────────

/// Top-level error used at the runtime boundary (`main`, `Runtime::build`).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
