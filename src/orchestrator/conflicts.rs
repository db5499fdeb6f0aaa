//! Conflict detection and resolution between agent decisions.
//!
//! Rules, applied in tie-break order:
//! 1. mutual-exclusion-hvac — heating and cooling both act: drop both.
//! 2. security-priority — security and lighting touch the same entities:
//!    keep security, drop the lighting overlap.
//! 3. away-comfort — away mode set while heating/cooling want explicit
//!    set-points: force the eco preset instead.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent::{ActionCall, Decision};

/// A detected conflict and how it was resolved.  Derived per cycle; attached
/// to the cycle log, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_id: String,
    pub agent_ids: Vec<String>,
    pub kind: String,
    pub description: String,
    pub resolution: String,
}

/// Apply the rule set to this cycle's decisions.
pub fn resolve(decisions: Vec<Decision>, away_mode: bool) -> (Vec<Decision>, Vec<Conflict>) {
    let mut decisions = decisions;
    let mut conflicts = Vec::new();

    apply_hvac_mutual_exclusion(&mut decisions, &mut conflicts);
    apply_security_priority(&mut decisions, &mut conflicts);
    if away_mode {
        apply_away_comfort(&mut decisions, &mut conflicts);
    }

    (decisions, conflicts)
}

/// Heating and cooling both producing actions in one cycle cancel each other.
fn apply_hvac_mutual_exclusion(decisions: &mut Vec<Decision>, conflicts: &mut Vec<Conflict>) {
    let active = |id: &str| {
        decisions
            .iter()
            .any(|d| d.agent_id == id && !d.actions.is_empty())
    };

    if active("heating") && active("cooling") {
        conflicts.push(Conflict {
            conflict_id: "conflict_heating_cooling".to_string(),
            agent_ids: vec!["heating".to_string(), "cooling".to_string()],
            kind: "mutual_exclusion".to_string(),
            description: "Cannot heat and cool simultaneously".to_string(),
            resolution: "disable_both".to_string(),
        });
        decisions.retain(|d| d.agent_id != "heating" && d.agent_id != "cooling");
        log::warn!("resolved heating/cooling conflict: dropped both agents' actions");
    }
}

/// Security actions override lighting actions on the same entities.
fn apply_security_priority(decisions: &mut [Decision], conflicts: &mut Vec<Conflict>) {
    let security_entities: HashSet<String> = decisions
        .iter()
        .filter(|d| d.agent_id == "security")
        .flat_map(|d| d.touched_entities().into_iter().map(str::to_owned))
        .collect();
    if security_entities.is_empty() {
        return;
    }

    let mut overlap = Vec::new();
    for decision in decisions.iter_mut().filter(|d| d.agent_id == "lighting") {
        let before = decision.actions.len();
        decision.actions.retain(|action| {
            action
                .entity_id()
                .map_or(true, |entity| !security_entities.contains(entity))
        });
        if decision.actions.len() < before {
            overlap.push(before - decision.actions.len());
        }
    }

    if !overlap.is_empty() {
        conflicts.push(Conflict {
            conflict_id: "conflict_security_lighting".to_string(),
            agent_ids: vec!["security".to_string(), "lighting".to_string()],
            kind: "security_priority".to_string(),
            description: "Security settings override comfort automation".to_string(),
            resolution: "security_priority".to_string(),
        });
        log::warn!("resolved security/lighting overlap: dropped lighting actions");
    }
}

/// With away mode set, explicit HVAC set-points become an eco preset.
fn apply_away_comfort(decisions: &mut [Decision], conflicts: &mut Vec<Conflict>) {
    let mut affected = Vec::new();

    for decision in decisions
        .iter_mut()
        .filter(|d| d.agent_id == "heating" || d.agent_id == "cooling")
    {
        let mut replaced = Vec::new();
        for action in &decision.actions {
            if action.tool == "set_temperature" {
                if let Some(entity) = action.entity_id() {
                    replaced.push(ActionCall::new(
                        "call_service",
                        json!({
                            "domain": "climate",
                            "service": "set_preset_mode",
                            "entity_id": entity,
                            "service_data": {"preset_mode": "eco"},
                        }),
                    ));
                    continue;
                }
            }
            replaced.push(action.clone());
        }
        if replaced != decision.actions {
            affected.push(decision.agent_id.clone());
            decision.actions = replaced;
        }
    }

    if !affected.is_empty() {
        conflicts.push(Conflict {
            conflict_id: "conflict_away_comfort".to_string(),
            agent_ids: affected,
            kind: "away_comfort".to_string(),
            description: "Away mode overrides comfort targets".to_string(),
            resolution: "eco_mode".to_string(),
        });
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
