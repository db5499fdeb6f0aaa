//! Prompt assembly for agent decision cycles.

use crate::tools::ToolInfo;

use super::{context::AgentContext, spec::AgentSpec};

/// The role banner: who the agent is, what it controls, what it knows, and
/// the standing safety contract.
pub fn role_banner(spec: &AgentSpec) -> String {
    let entities = if spec.entities.is_empty() {
        "Dynamic/All".to_string()
    } else {
        spec.entities.join(", ")
    };
    let knowledge = if spec.knowledge.is_empty() {
        "No additional context provided."
    } else {
        &spec.knowledge
    };

    format!(
        "# AGENT ROLE: {name}\n\
         # TARGET ENTITIES: {entities}\n\
         \n\
         # PRIMARY INSTRUCTION\n\
         {instruction}\n\
         \n\
         # KNOWLEDGE / CONTEXT\n\
         {knowledge}\n\
         \n\
         # CAPABILITIES & SAFETY\n\
         1. You have access to device-bus services via the `call_service` tool.\n\
         2. ACCESS RESTRICTIONS: You CANNOT access 'shell_command', 'hassio', 'script', or 'automation' domains.\n\
         3. APPROVAL REQUIRED: High-impact actions (e.g. unlocking doors, disarming alarms) will be queued for human approval.\n\
         4. VALIDATION: Generic service calls (e.g. set_temperature) must still adhere to safety limits.",
        name = spec.name,
        entities = entities,
        instruction = spec.instruction,
    )
}

/// The full per-cycle decision prompt.
pub fn decision_prompt(
    spec: &AgentSpec,
    context: &AgentContext,
    services_text: &str,
    tools: &[ToolInfo],
) -> String {
    let mut tool_lines = String::new();
    for tool in tools {
        tool_lines.push_str(&format!(
            "- {}: {} — parameters: {}\n",
            tool.name, tool.description, tool.schema
        ));
    }

    format!(
        "{banner}\n\
         \n\
         CURRENT SITUATION:\n\
         Time: {timestamp}\n\
         \n\
         ENTITY STATES:\n\
         {states}\n\
         {services}\n\
         AVAILABLE TOOLS:\n\
         {tools}\n\
         CRITICAL RULES:\n\
         1. You MUST only use entity ids listed in ENTITY STATES. Do NOT guess or hallucinate ids.\n\
         2. If the entity is absent, use the `log` tool to record the gap.\n\
         3. Prefer specialised tools over `call_service`. Use `call_service` only for generic services.\n\
         4. Output standard JSON, no comments, no markdown.\n\
         \n\
         TOOL USAGE EXAMPLES:\n\
         - Correct (specific): {{\"tool\": \"set_temperature\", \"parameters\": {{\"entity_id\": \"climate.bedroom\", \"temperature\": 21.0}}}}\n\
         - Correct (generic): {{\"tool\": \"call_service\", \"parameters\": {{\"domain\": \"light\", \"service\": \"turn_on\", \"entity_id\": \"light.living_room\", \"service_data\": {{\"brightness_pct\": 50}}}}}}\n\
         - Incorrect (wrong tool): {{\"tool\": \"call_service\", \"parameters\": {{\"entity_id\": \"climate.bedroom\", \"service\": \"set_target_temp\"}}}} -> there is NO 'set_target_temp' service; use the 'set_temperature' tool.\n\
         - Incorrect (missing domain): {{\"tool\": \"call_service\", \"parameters\": {{\"service\": \"turn_on\", \"entity_id\": \"light.foo\"}}}} -> missing \"domain\": \"light\".\n\
         \n\
         Based on your PRIMARY INSTRUCTION and the CURRENT SITUATION, determine if any action is needed.\n\
         Respond with a JSON object containing 'reasoning' and 'actions'.\n\
         Each action MUST have a 'tool' field and 'parameters'.\n\
         If no action is needed, return an empty actions array.",
        banner = role_banner(spec),
        timestamp = context.timestamp,
        states = context.state_description,
        services = if services_text.is_empty() {
            String::new()
        } else {
            format!("\n{services_text}\n")
        },
        tools = tool_lines,
    )
}
