//! The chat gateway: a synchronous one-shot "speak to the orchestrator"
//! entry point reusing the tool layer.

use serde_json::{json, Value};

use crate::{
    agent::parser::extract_json,
    bus::DeviceBus,
    provider::{ChatMessage, ChatRequest},
};

use super::pipeline::Orchestrator;

/// Domains worth showing in the trimmed chat snapshot.
const CHAT_DOMAINS: &[&str] = &[
    "light",
    "switch",
    "climate",
    "lock",
    "cover",
    "media_player",
    "vacuum",
];

/// Maximum entity lines included in the chat prompt.
const CHAT_SNAPSHOT_CAP: usize = 60;

/// What the gateway returns to the caller.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: String,
    pub actions_executed: Vec<Value>,
}

impl Orchestrator {
    /// Process a direct user message: snapshot the home, prompt the model,
    /// execute any `call_service` actions it proposes, answer synchronously.
    pub async fn chat(&self, user_message: &str) -> ChatOutcome {
        let context = self.chat_snapshot().await;

        let prompt = format!(
            "You are the AI orchestrator for this home.\n\
             The user is asking you a question or giving a command.\n\
             \n\
             CURRENT HOME STATE:\n\
             {context}\n\
             \n\
             AVAILABLE TOOLS:\n\
             - call_service: Execute device-bus services. Params: domain, service, entity_id, service_data.\n\
             \n\
             USER MESSAGE: \"{user_message}\"\n\
             \n\
             INSTRUCTIONS:\n\
             1. If this is a question, answer it based on the home state.\n\
             2. If this is a command (e.g. \"Turn on the light\"), execute it using the `call_service` tool.\n\
             3. You can execute multiple tools if needed.\n\
             4. Respond with a JSON object:\n\
             {{\"thought\": \"...\", \"response\": \"...\", \"actions\": [{{\"tool\": \"call_service\", \"parameters\": {{...}}}}]}}\n\
             5. NO COMMENTS in the JSON.",
        );

        let request = ChatRequest::new(
            self.planner_model.clone(),
            vec![ChatMessage::user(prompt)],
        )
        .json_object();

        let content = match self.provider.chat(request).await {
            Ok(response) => response.content,
            Err(e) => {
                log::error!("chat model call failed: {e}");
                return ChatOutcome {
                    response: format!(
                        "Communication error: I couldn't reach the model ({}). Error: {e}",
                        self.provider.base_url()
                    ),
                    actions_executed: Vec::new(),
                };
            }
        };

        let data = match extract_json(&content) {
            Ok(value) => value,
            Err(e) => {
                log::error!("chat response unparseable: {e}");
                return ChatOutcome {
                    response: "I had trouble structuring my thoughts. Please try again."
                        .to_string(),
                    actions_executed: Vec::new(),
                };
            }
        };

        let mut actions_executed = Vec::new();
        if let Some(actions) = data["actions"].as_array() {
            for action in actions {
                let tool = action["tool"].as_str().unwrap_or_default();
                let parameters = action.get("parameters").cloned().unwrap_or(json!({}));

                // Only the universal tool is reachable from chat.
                if tool != "call_service" && tool != "execute_service" {
                    log::warn!("chat proposed unsupported tool '{tool}', skipping");
                    continue;
                }

                let result = self
                    .tools
                    .execute("call_service", parameters.clone(), "orchestrator")
                    .await;
                let summary = format!(
                    "Executed {} on {}",
                    parameters["service"].as_str().unwrap_or("?"),
                    parameters["entity_id"].as_str().unwrap_or("?")
                );
                actions_executed.push(json!({"tool": summary, "result": result}));
            }
        }

        ChatOutcome {
            response: data["response"]
                .as_str()
                .unwrap_or("I've processed your request.")
                .to_string(),
            actions_executed,
        }
    }

    /// Trimmed home snapshot for the chat prompt.
    async fn chat_snapshot(&self) -> String {
        let client = match self.bus.get() {
            Ok(client) => client,
            Err(_) => return "Error fetching home state.".to_string(),
        };
        let states = match client.get_states(None).await {
            Ok(states) => states,
            Err(_) => return "Error fetching home state.".to_string(),
        };

        states
            .iter()
            .filter(|s| CHAT_DOMAINS.contains(&s.domain()))
            .take(CHAT_SNAPSHOT_CAP)
            .map(|s| format!("- {} ({}): {}", s.friendly_name(), s.entity_id, s.state))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
