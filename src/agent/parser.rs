//! Forgiving parsing of model responses.
//!
//! [`extract_json`] is the entire bridge between the language-model world and
//! the typed core: strip markdown fences and comments, then retry once with
//! trailing commas removed.  [`parse_decision`] never fails — an
//! unextractable response becomes a no-op decision with the failure recorded
//! in `reasoning`.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::approval::ImpactLevel;

use super::types::{ActionCall, Decision};

fn line_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"//[^\n]*").unwrap())
}

fn block_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap())
}

fn trailing_comma_object() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*\}").unwrap())
}

fn trailing_comma_array() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*\]").unwrap())
}

/// Extract a JSON value from model output.
///
/// Pass 1: strip markdown fences (and a stray leading `json` tag) and
/// single-line / block comments.  Pass 2 (only if parsing still fails):
/// remove trailing commas and retry.
pub fn extract_json(text: &str) -> Result<Value, String> {
    let mut cleaned = text.trim().to_string();

    // Strip markdown fences.
    if cleaned.starts_with("```") {
        cleaned = match cleaned.split_once('\n') {
            Some((_, rest)) => rest.to_string(),
            None => cleaned.trim_start_matches('`').to_string(),
        };
        if let Some(stripped) = cleaned.trim_end().strip_suffix("```") {
            cleaned = stripped.to_string();
        }
    }
    let cleaned = cleaned.trim();
    let cleaned = cleaned.strip_prefix("json").unwrap_or(cleaned).trim();

    // Strip comments.  Naive on purpose: comments inside string literals are
    // not worth protecting against here, matching the cleanup the models
    // actually need.
    let cleaned = line_comment().replace_all(cleaned, "");
    let cleaned = block_comment().replace_all(&cleaned, "");

    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(_) => {
            let cleaned = trailing_comma_object().replace_all(&cleaned, "}");
            let cleaned = trailing_comma_array().replace_all(&cleaned, "]");
            serde_json::from_str(&cleaned).map_err(|e| e.to_string())
        }
    }
}

/// Parse a model response into a [`Decision`] for `agent_id`.
///
/// Action entries must carry a `tool` name; entries carrying only a `service`
/// key (a common model slip) are wrapped as `call_service` invocations;
/// anything else is dropped.
pub fn parse_decision(content: &str, agent_id: &str) -> Decision {
    let value = match extract_json(content) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("{agent_id}: unparseable model response: {e}");
            return Decision::noop(agent_id, format!("parse failure: {e}"));
        }
    };

    let reasoning = value["reasoning"].as_str().unwrap_or_default().to_string();
    let confidence = value["confidence"].as_f64().unwrap_or(1.0) as f32;
    let impact_level = value["impact_level"]
        .as_str()
        .and_then(ImpactLevel::parse)
        .unwrap_or_default();

    let mut actions = Vec::new();
    if let Some(entries) = value["actions"].as_array() {
        for entry in entries {
            if let Some(tool) = entry.get("tool").and_then(Value::as_str) {
                let parameters = entry
                    .get("parameters")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default()));
                actions.push(ActionCall::new(tool, parameters));
            } else if entry.get("service").is_some() {
                // Legacy shape: the whole entry is the service-call payload.
                actions.push(ActionCall::new("call_service", entry.clone()));
            } else {
                log::warn!("{agent_id}: dropping malformed action entry: {entry}");
            }
        }
    }

    Decision {
        agent_id: agent_id.to_string(),
        reasoning,
        actions,
        confidence,
        impact_level,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── extract_json ──────────────────────────────────────────────────────────

    #[test]
    fn plain_json_passes_through() {
        let value = extract_json(r#"{"reasoning": "ok", "actions": []}"#).unwrap();
        assert_eq!(value["reasoning"], "ok");
    }

    #[test]
    fn markdown_fences_are_stripped() {
        let text = "```json\n{\"actions\": []}\n```";
        assert!(extract_json(text).unwrap()["actions"].is_array());

        let bare_fence = "```\n{\"actions\": []}\n```";
        assert!(extract_json(bare_fence).unwrap()["actions"].is_array());
    }

    #[test]
    fn leading_json_tag_is_stripped() {
        let text = "json {\"actions\": []}";
        assert!(extract_json(text).unwrap()["actions"].is_array());
    }

    #[test]
    fn line_comments_are_removed() {
        let text = "{\n  \"reasoning\": \"x\", // why not\n  \"actions\": []\n}";
        let value = extract_json(text).unwrap();
        assert_eq!(value["reasoning"], "x");
    }

    #[test]
    fn block_comments_are_removed() {
        let text = "{\"reasoning\": \"x\", /* spanning\nlines */ \"actions\": []}";
        assert!(extract_json(text).is_ok());
    }

    #[test]
    fn trailing_commas_are_fixed_on_retry() {
        let text = r#"{"actions": [{"tool": "log", "parameters": {"message": "hi",},},],}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["actions"][0]["tool"], "log");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(extract_json("I cannot answer in JSON, sorry.").is_err());
        assert!(extract_json("").is_err());
    }

    #[test]
    fn fenced_commented_trailing_comma_combo() {
        let text = "```json\n{\n  // plan\n  \"reasoning\": \"adjust\",\n  \"actions\": [\n    {\"tool\": \"set_temperature\", \"parameters\": {\"entity_id\": \"climate.bed\", \"temperature\": 21.0,}},\n  ]\n}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["actions"][0]["parameters"]["temperature"], 21.0);
    }

    // ── parse_decision ────────────────────────────────────────────────────────

    #[test]
    fn well_formed_decision_parses() {
        let content = json!({
            "reasoning": "bedroom is cold",
            "confidence": 0.8,
            "impact_level": "medium",
            "actions": [
                {"tool": "set_temperature",
                 "parameters": {"entity_id": "climate.bedroom", "temperature": 21.0}}
            ]
        })
        .to_string();

        let decision = parse_decision(&content, "heating");
        assert_eq!(decision.agent_id, "heating");
        assert_eq!(decision.actions.len(), 1);
        assert_eq!(decision.actions[0].tool, "set_temperature");
        assert_eq!(decision.confidence, 0.8);
        assert_eq!(decision.impact_level, ImpactLevel::Medium);
    }

    #[test]
    fn parse_failure_becomes_noop_decision() {
        let decision = parse_decision("total nonsense", "heating");
        assert!(decision.is_noop());
        assert!(decision.reasoning.starts_with("parse failure"));
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn legacy_service_entry_maps_to_call_service() {
        let content = json!({
            "reasoning": "turn it on",
            "actions": [
                {"service": "turn_on", "domain": "light", "entity_id": "light.kitchen"}
            ]
        })
        .to_string();

        let decision = parse_decision(&content, "lighting");
        assert_eq!(decision.actions.len(), 1);
        assert_eq!(decision.actions[0].tool, "call_service");
        assert_eq!(decision.actions[0].parameters["service"], "turn_on");
    }

    #[test]
    fn malformed_action_entries_are_dropped() {
        let content = json!({
            "reasoning": "mixed bag",
            "actions": [
                {"tool": "log", "parameters": {"message": "ok"}},
                {"neither": "tool nor service"},
                "not even an object"
            ]
        })
        .to_string();

        let decision = parse_decision(&content, "heating");
        assert_eq!(decision.actions.len(), 1);
        assert_eq!(decision.actions[0].tool, "log");
    }

    #[test]
    fn missing_actions_array_is_a_noop() {
        let decision = parse_decision(r#"{"reasoning": "all optimal"}"#, "heating");
        assert!(decision.is_noop());
        assert_eq!(decision.reasoning, "all optimal");
    }

    #[test]
    fn action_without_parameters_gets_empty_object() {
        let content = json!({"actions": [{"tool": "get_climate_state"}]}).to_string();
        let decision = parse_decision(&content, "heating");
        assert!(decision.actions[0].parameters.is_object());
    }
}
