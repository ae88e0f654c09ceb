use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use ureq::Agent;

use crate::config::LlmConfig;
use crate::error::ToolError;

/// One chat round-trip: a system prompt, a user prompt and sampling knobs.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the provider to ground the answer in a web search.
    pub web_search: bool,
}

impl<'a> ChatRequest<'a> {
    pub fn new(system: &'a str, user: impl Into<String>) -> Self {
        ChatRequest {
            system,
            user: user.into(),
            temperature: None,
            max_tokens: None,
            web_search: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }
}

/// A chat-completion backend.
pub trait ChatModel {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ToolError>;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints
/// (DashScope compatible mode by default).
pub struct OpenAiCompatible {
    agent: Agent,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatible {
    pub fn new(config: &LlmConfig) -> Self {
        let agent_config = Agent::config_builder()
            .http_status_as_error(false)
            .build();
        OpenAiCompatible {
            agent: Agent::new_with_config(agent_config),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn payload<'a>(&'a self, request: &'a ChatRequest<'a>) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: request.system,
                },
                Message {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature.unwrap_or(self.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            enable_thinking: false,
            enable_search: request.web_search.then_some(true),
        }
    }
}

impl ChatModel for OpenAiCompatible {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ToolError> {
        let payload = self.payload(request);
        debug!(
            model = %payload.model,
            temperature = payload.temperature,
            prompt_len = request.user.len(),
            web_search = request.web_search,
            "sending chat completion"
        );

        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send_json(&payload)?;

        let status = response.status();
        let body = response.body_mut().read_to_string()?;
        if !status.is_success() {
            return Err(ToolError::Status {
                status: status.as_u16(),
                body: error_message(&body),
            });
        }
        trace!(body = %body, "chat completion response");
        extract_content(&body)
    }
}

/// Pull the first choice's text out of a completion response body.
fn extract_content(body: &str) -> Result<String, ToolError> {
    let parsed: CompletionResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(ToolError::EmptyResponse("chat completion"))
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => env.error.message,
        Err(_) => body.chars().take(300).collect(),
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string (e.g. "json") up to the first newline.
        s = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest.trim_start_matches("json"),
        };
    }
    s.trim().trim_end_matches("```").trim()
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    enable_thinking: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_search: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
