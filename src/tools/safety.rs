//! Safety gate configuration for the tool layer.

use std::collections::HashSet;

use crate::config::schema::SafetyLimitsConfig;

/// Agent id stamped on approval requests raised by the safety gates, so
/// per-agent auto-approval rules never apply to escalated service calls.
pub const SAFETY_GATE_AGENT: &str = "safety_gate";

const DEFAULT_BLOCKED_DOMAINS: &[&str] =
    &["shell_command", "hassio", "script", "automation", "rest_command"];

const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "light",
    "switch",
    "fan",
    "climate",
    "media_player",
    "cover",
    "input_boolean",
    "input_select",
    "input_number",
    "scene",
    "button",
    "vacuum",
    "water_heater",
    "lock",
    "alarm_control_panel",
    "camera",
];

const DEFAULT_HIGH_IMPACT_SERVICES: &[&str] = &[
    "lock.unlock",
    "lock.lock",
    "alarm_control_panel.alarm_disarm",
    "alarm_control_panel.alarm_arm_home",
    "alarm_control_panel.alarm_arm_away",
    "camera.disable_motion_detection",
    "camera.turn_off",
];

/// Blocklist, allowlist, high-impact routing table, and climate bounds.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub blocked_domains: HashSet<String>,
    pub allowed_domains: HashSet<String>,
    pub high_impact_services: HashSet<String>,
    pub min_temp: f64,
    pub max_temp: f64,
    pub max_temp_change: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            blocked_domains: to_set(DEFAULT_BLOCKED_DOMAINS),
            allowed_domains: to_set(DEFAULT_ALLOWED_DOMAINS),
            high_impact_services: to_set(DEFAULT_HIGH_IMPACT_SERVICES),
            min_temp: 10.0,
            max_temp: 30.0,
            max_temp_change: 3.0,
        }
    }
}

impl SafetyConfig {
    /// Build from process configuration.  Empty list overrides keep the
    /// defaults.
    pub fn from_limits(limits: &SafetyLimitsConfig) -> Self {
        let mut config = Self::default();
        if !limits.blocked_domains.is_empty() {
            config.blocked_domains = limits.blocked_domains.iter().cloned().collect();
        }
        if !limits.allowed_domains.is_empty() {
            config.allowed_domains = limits.allowed_domains.iter().cloned().collect();
        }
        if !limits.high_impact_services.is_empty() {
            config.high_impact_services = limits.high_impact_services.iter().cloned().collect();
        }
        config.min_temp = limits.min_temp;
        config.max_temp = limits.max_temp;
        config.max_temp_change = limits.max_temp_change;
        config
    }

    pub fn is_blocked(&self, domain: &str) -> bool {
        self.blocked_domains.contains(domain)
    }

    pub fn is_allowed(&self, domain: &str) -> bool {
        self.allowed_domains.contains(domain)
    }

    pub fn is_high_impact(&self, domain: &str, service: &str) -> bool {
        self.high_impact_services
            .contains(&format!("{domain}.{service}"))
    }
}

fn to_set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_block_automation_surfaces() {
        let config = SafetyConfig::default();
        for domain in ["shell_command", "hassio", "script", "automation", "rest_command"] {
            assert!(config.is_blocked(domain), "{domain} should be blocked");
        }
        assert!(!config.is_blocked("light"));
    }

    #[test]
    fn defaults_allow_controllable_domains() {
        let config = SafetyConfig::default();
        assert!(config.is_allowed("climate"));
        assert!(config.is_allowed("lock"));
        assert!(!config.is_allowed("unknown_domain"));
    }

    #[test]
    fn lock_and_alarm_services_are_high_impact() {
        let config = SafetyConfig::default();
        assert!(config.is_high_impact("lock", "unlock"));
        assert!(config.is_high_impact("lock", "lock"));
        assert!(config.is_high_impact("alarm_control_panel", "alarm_disarm"));
        assert!(config.is_high_impact("camera", "turn_off"));
        assert!(!config.is_high_impact("light", "turn_on"));
    }

    #[test]
    fn overrides_replace_lists_but_empty_keeps_defaults() {
        let mut limits = SafetyLimitsConfig::default();
        limits.blocked_domains = vec!["vacuum".to_string()];
        limits.max_temp_change = 1.5;

        let config = SafetyConfig::from_limits(&limits);
        assert!(config.is_blocked("vacuum"));
        assert!(!config.is_blocked("shell_command"), "override replaces the default list");
        // Untouched lists keep defaults.
        assert!(config.is_allowed("light"));
        assert_eq!(config.max_temp_change, 1.5);
    }
}
