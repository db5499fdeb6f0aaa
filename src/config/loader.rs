//! TOML configuration loading, env-var overrides, and atomic saves.
//!
//! # Loading order
//! 1. Parse `~/.hearthd/hearthd.toml` (or the path in `HEARTHD_CONFIG`)
//! 2. Apply `HEARTHD_*` environment variable overrides
//! 3. Fall back to [`AppConfig::default()`] if the file is missing
//!
//! # Atomic save
//! Writes to `<path>.tmp` → backup → rename to `<path>` to avoid partial
//! writes corrupting the config file.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::error::ConfigError;

use super::schema::AppConfig;

// ─── default_config_path ─────────────────────────────────────────────────────

/// Return the default config file path: `~/.hearthd/hearthd.toml`.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hearthd")
        .join("hearthd.toml")
}

// ─── load_config ─────────────────────────────────────────────────────────────

/// Load [`AppConfig`] from the given path, falling back to defaults if the
/// file does not exist, then applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<AppConfig>(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })
        }
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load config from the default path (or `HEARTHD_CONFIG`).
pub fn load_default_config() -> AppConfig {
    let path = env::var("HEARTHD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path());

    load_config(&path).unwrap_or_default()
}

// ─── apply_env_overrides ─────────────────────────────────────────────────────

/// Apply `HEARTHD_*` environment variable overrides to `config`.
///
/// Supported overrides:
/// - `HEARTHD_BUS_URL`             → `bus.url`
/// - `HEARTHD_BUS_TOKEN`           → `bus.access_token`
/// - `HEARTHD_PROVIDER_KIND`       → `provider.kind`
/// - `HEARTHD_PROVIDER_URL`        → `provider.base_url`
/// - `HEARTHD_PROVIDER_API_KEY`    → `provider.api_key`
/// - `HEARTHD_DEFAULT_MODEL`       → `provider.default_model`
/// - `HEARTHD_PLANNER_MODEL`       → `provider.planner_model`
/// - `HEARTHD_DRY_RUN`             → `safety.dry_run` (1/0)
/// - `HEARTHD_BLOCKED_DOMAINS`     → `safety.blocked_domains` (comma-separated)
/// - `HEARTHD_ALLOWED_DOMAINS`     → `safety.allowed_domains` (comma-separated)
/// - `HEARTHD_HIGH_IMPACT_SERVICES`→ `safety.high_impact_services` (comma-separated)
/// - `HEARTHD_MIN_TEMP` / `HEARTHD_MAX_TEMP` / `HEARTHD_MAX_TEMP_CHANGE`
/// - `HEARTHD_PLANNING_INTERVAL`   → `orchestrator.planning_interval_secs`
/// - `HEARTHD_DECISION_INTERVAL`   → `orchestrator.default_decision_interval_secs`
/// - `HEARTHD_DATA_DIR`            → `paths.data_dir`
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(v) = env::var("HEARTHD_BUS_URL") {
        config.bus.url = v;
    }
    if let Ok(v) = env::var("HEARTHD_BUS_TOKEN") {
        config.bus.access_token = v;
    }
    if let Ok(v) = env::var("HEARTHD_PROVIDER_KIND") {
        config.provider.kind = v;
    }
    if let Ok(v) = env::var("HEARTHD_PROVIDER_URL") {
        config.provider.base_url = v;
    }
    if let Ok(v) = env::var("HEARTHD_PROVIDER_API_KEY") {
        config.provider.api_key = v;
    }
    if let Ok(v) = env::var("HEARTHD_DEFAULT_MODEL") {
        config.provider.default_model = v;
    }
    if let Ok(v) = env::var("HEARTHD_PLANNER_MODEL") {
        config.provider.planner_model = v;
    }
    if let Ok(v) = env::var("HEARTHD_DRY_RUN") {
        config.safety.dry_run = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = env::var("HEARTHD_BLOCKED_DOMAINS") {
        config.safety.blocked_domains = split_csv(&v);
    }
    if let Ok(v) = env::var("HEARTHD_ALLOWED_DOMAINS") {
        config.safety.allowed_domains = split_csv(&v);
    }
    if let Ok(v) = env::var("HEARTHD_HIGH_IMPACT_SERVICES") {
        config.safety.high_impact_services = split_csv(&v);
    }
    if let Ok(v) = env::var("HEARTHD_MIN_TEMP") {
        if let Ok(t) = v.parse::<f64>() {
            config.safety.min_temp = t;
        }
    }
    if let Ok(v) = env::var("HEARTHD_MAX_TEMP") {
        if let Ok(t) = v.parse::<f64>() {
            config.safety.max_temp = t;
        }
    }
    if let Ok(v) = env::var("HEARTHD_MAX_TEMP_CHANGE") {
        if let Ok(t) = v.parse::<f64>() {
            config.safety.max_temp_change = t;
        }
    }
    if let Ok(v) = env::var("HEARTHD_PLANNING_INTERVAL") {
        if let Ok(secs) = v.parse::<u64>() {
            config.orchestrator.planning_interval_secs = secs;
        }
    }
    if let Ok(v) = env::var("HEARTHD_DECISION_INTERVAL") {
        if let Ok(secs) = v.parse::<u64>() {
            config.orchestrator.default_decision_interval_secs = secs;
        }
    }
    if let Ok(v) = env::var("HEARTHD_DATA_DIR") {
        config.paths.data_dir = Some(v);
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ─── save_config ─────────────────────────────────────────────────────────────

/// Atomically save `config` to `path`.
///
/// Writes to `<path>.tmp`, creates a backup of the existing file as
/// `<path>.bak`, then renames the temp file to `<path>`.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let io_err = |e: std::io::Error| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &content).map_err(io_err)?;

    if path.exists() {
        let bak_path = path.with_extension("toml.bak");
        fs::copy(path, &bak_path).map_err(io_err)?;
    }

    fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
