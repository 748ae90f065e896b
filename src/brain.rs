use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::config::OracleConfig;
use crate::errors::{AgentError, AgentResult};
use crate::types::{ActionKind, ActionProposal, TaskContext};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const SYSTEM_PROMPT: &str = r#"You are a web automation agent controlling a real browser.
Your goal is to complete the given task by interacting with web pages, one action at a time.

Available actions:
- type: Type text into an input field. Parameters: {"element_id": "input_0", "text": "...", "clear_first": true}
- click: Click an element. Parameters: {"element_id": "button_0"} (add "programmatic": true if a normal click keeps failing)
- submit: Submit a form. Parameters: {"element_id": "input_0"}, or {} to submit the first form on the page
- scroll: Scroll the page. Parameters: {"direction": "up" | "down" | "top" | "bottom", "amount": 400}
- select: Choose a dropdown option. Parameters: {"element_id": "select_0", "option": "...", "by": "text" | "value" | "index"}
- done: The task is complete. Parameters: {"result": "the answer or a summary of what was achieved"}
- error: You cannot proceed. Parameters: {}

Rules:
1. Use only the element ids shown in the current Page Analysis. Ids from earlier steps are no longer valid.
2. If an action failed, the page is shown again; pick a different approach.
3. Respond with a single JSON object and nothing else:
{
    "action": "action_name",
    "parameters": {...},
    "reasoning": "why you chose this action",
    "progress": "what you've accomplished so far"
}"#;

/// The external reasoning service: one prompt in, free text out.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> AgentResult<String>;
}

#[async_trait]
impl<T: ReasoningOracle + ?Sized> ReasoningOracle for Arc<T> {
    async fn complete(&self, system: &str, prompt: &str) -> AgentResult<String> {
        (**self).complete(system, prompt).await
    }
}

/// Anthropic Messages API client.
pub struct AnthropicOracle {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicOracle {
    pub fn new(config: &OracleConfig) -> AgentResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AgentError::Config("ANTHROPIC_API_KEY not set in environment".into()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ReasoningOracle for AnthropicOracle {
    async fn complete(&self, system: &str, prompt: &str) -> AgentResult<String> {
        let response = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
                "system": system,
                "messages": [{ "role": "user", "content": prompt }],
            }))
            .send()
            .await
            .map_err(|e| AgentError::OracleCommunication(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| AgentError::OracleCommunication(e.to_string()))?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error");
            return Err(AgentError::OracleCommunication(format!(
                "API error ({status}): {message}"
            )));
        }

        first_text_block(&body)
            .ok_or_else(|| AgentError::OracleCommunication(format!("no text in response: {body}")))
    }
}

fn first_text_block(body: &Value) -> Option<String> {
    body["content"]
        .as_array()?
        .iter()
        .find(|block| block["type"] == "text")
        .and_then(|block| block["text"].as_str())
        .map(str::to_string)
}

/// Turns a task context and a rendered page summary into the next action.
pub struct DecisionEngine<O> {
    oracle: O,
    history_window: usize,
}

impl<O: ReasoningOracle> DecisionEngine<O> {
    pub fn new(oracle: O, history_window: usize) -> Self {
        Self {
            oracle,
            history_window,
        }
    }

    /// Never fails: transport faults and unusable replies come back as `error` proposals.
    pub async fn decide(&self, task: &TaskContext, summary: &str) -> ActionProposal {
        let prompt = self.build_prompt(task, summary);
        match self.oracle.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => {
                debug!(step = task.step_index, %raw, "oracle replied");
                let proposal = parse_proposal(&raw);
                info!(
                    step = task.step_index,
                    action = %proposal.action,
                    reasoning = %proposal.reasoning,
                    "decision"
                );
                proposal
            }
            Err(e) => {
                error!(step = task.step_index, error = %e, "oracle call failed");
                let fault = match e {
                    AgentError::OracleCommunication(_) => e,
                    other => AgentError::OracleCommunication(other.to_string()),
                };
                ActionProposal::error(fault.to_string(), "")
            }
        }
    }

    pub fn build_prompt(&self, task: &TaskContext, summary: &str) -> String {
        let recent = task.recent_history(self.history_window);
        let history = if recent.is_empty() {
            "None".to_string()
        } else {
            recent
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "Current Task: {goal}\n\n\
             Current Step: {step}/{budget}\n\n\
             Page Analysis:\n{summary}\n\n\
             Previous Actions:\n{history}\n\n\
             What should be the next action to complete the task?",
            goal = task.goal,
            step = task.step_index,
            budget = task.step_budget,
        )
    }
}

/// Reads a proposal out of untrusted oracle text.
pub fn parse_proposal(raw: &str) -> ActionProposal {
    let Some(object) = extract_json_object(raw) else {
        let reason = AgentError::OracleMalformedResponse("no JSON object found".into());
        return ActionProposal::error(reason.to_string(), raw);
    };

    let action = match object.get("action").and_then(Value::as_str) {
        Some(tag) => match tag.parse::<ActionKind>() {
            Ok(kind) => kind,
            Err(e) => return ActionProposal::error(e.to_string(), raw),
        },
        None => {
            let reason = AgentError::OracleMalformedResponse("missing \"action\" field".into());
            return ActionProposal::error(reason.to_string(), raw);
        }
    };

    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    ActionProposal {
        action,
        parameters: object
            .get("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        reasoning: text("reasoning"),
        progress: text("progress"),
    }
}

/// Finds the first balanced `{...}` region that decodes to a JSON object.
///
/// Braces inside string literals are ignored, so prose around the object and
/// braces in the reasoning text do not throw the scan off.
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(bytes, start) {
            if let Ok(Value::Object(map)) = serde_json::from_str(&text[start..=end]) {
                return Some(map);
            }
        }
        search_from = start + 1;
    }
    None
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
