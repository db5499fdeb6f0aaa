//! TOML configuration schema for hearthd.
//!
//! All fields have `#[serde(default)]` so a partially-filled `hearthd.toml`
//! works correctly.  Missing sections fall back to their `Default` impl.
//!
//! Example `~/.hearthd/hearthd.toml`:
//! ```toml
//! [bus]
//! url = "http://homeassistant.local:8123"
//! access_token = "llat-..."
//!
//! [provider]
//! kind = "local"
//! base_url = "http://localhost:11434"
//! default_model = "mistral:7b-instruct"
//!
//! [safety]
//! dry_run = true
//! min_temp = 10.0
//! max_temp = 30.0
//!
//! [orchestrator]
//! planning_interval_secs = 120
//! ```

use serde::{Deserialize, Serialize};

// ─── BusConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    /// Base URL of the device bus (`http://host:port`); the websocket
    /// endpoint is derived from it.
    pub url: String,
    /// Long-lived access token sent in the auth handshake.
    pub access_token: String,
    /// Default per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for full state dumps in seconds.
    pub states_timeout_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_owned(),
            access_token: String::new(),
            request_timeout_secs: 10,
            states_timeout_secs: 60,
        }
    }
}

// ─── ProviderConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider flavour: `"local"` (on-host model server) or `"hosted"`
    /// (remote OpenAI-style API).
    pub kind: String,
    /// Base URL of the model server.
    pub base_url: String,
    /// API key (hosted providers only; empty for local).
    pub api_key: String,
    /// Default model for agent decisions.
    pub default_model: String,
    /// Model used by the orchestrator's planner (falls back to `default_model`).
    pub planner_model: String,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: "local".to_owned(),
            base_url: "http://localhost:11434".to_owned(),
            api_key: String::new(),
            default_model: "mistral:7b-instruct".to_owned(),
            planner_model: String::new(),
            request_timeout_secs: 60,
        }
    }
}

impl ProviderConfig {
    /// The model the planner should use.
    pub fn planner_model(&self) -> &str {
        if self.planner_model.is_empty() {
            &self.default_model
        } else {
            &self.planner_model
        }
    }
}

// ─── SafetyLimitsConfig ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyLimitsConfig {
    /// When true, mutating tools simulate instead of touching the bus.
    pub dry_run: bool,
    /// Domains the universal tool refuses outright.  Empty means defaults.
    pub blocked_domains: Vec<String>,
    /// Domains the universal tool accepts.  Empty means defaults.
    pub allowed_domains: Vec<String>,
    /// `domain.service` names routed to the approval queue.  Empty means defaults.
    pub high_impact_services: Vec<String>,
    /// Climate set-point bounds (°C).
    pub min_temp: f64,
    pub max_temp: f64,
    /// Maximum set-point delta accepted in a single call (°C).
    pub max_temp_change: f64,
}

impl Default for SafetyLimitsConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            blocked_domains: Vec::new(),
            allowed_domains: Vec::new(),
            high_impact_services: Vec::new(),
            min_temp: 10.0,
            max_temp: 30.0,
            max_temp_change: 3.0,
        }
    }
}

// ─── OrchestratorConfig ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Seconds between planning cycles.
    pub planning_interval_secs: u64,
    /// Per-agent decision interval when the agents file does not set one.
    pub default_decision_interval_secs: u64,
    /// Bounded wait for agent decisions inside a cycle.
    pub agent_wait_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            planning_interval_secs: 120,
            default_decision_interval_secs: 120,
            agent_wait_secs: 30,
        }
    }
}

// ─── PathsConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PathsConfig {
    /// Data directory holding `approvals.db`, `agents.yaml`, and `decisions/`.
    /// Default: `~/.hearthd`.
    pub data_dir: Option<String>,
}

impl PathsConfig {
    pub fn data_dir(&self) -> std::path::PathBuf {
        match &self.data_dir {
            Some(dir) => std::path::PathBuf::from(dir),
            None => dirs::home_dir()
                .unwrap_or_else(|| std::path::PathBuf::from("."))
                .join(".hearthd"),
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// Loaded from `~/.hearthd/hearthd.toml`, falling back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub bus: BusConfig,
    pub provider: ProviderConfig,
    pub safety: SafetyLimitsConfig,
    pub orchestrator: OrchestratorConfig,
    pub paths: PathsConfig,
}
