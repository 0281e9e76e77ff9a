//! HTTP-backed consensus agents
//!
//! One adapter per provider. An agent is available when its API key is set;
//! deadlines are enforced by the orchestrator, not here.

use async_trait::async_trait;
use coordination::config::AgentModels;
use coordination::consensus::{Agent, AgentError, SharedAgent};
use serde_json::Value;
use std::sync::Arc;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

const MAX_OUTPUT_TOKENS: u32 = 4096;

fn api_key(var: &str) -> String {
    std::env::var(var).unwrap_or_default().trim().to_string()
}

/// POST a JSON body and decode the JSON reply, mapping HTTP failures to
/// agent errors.
async fn post_json(
    request: reqwest::RequestBuilder,
    body: &Value,
    provider: &str,
) -> Result<Value, AgentError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| AgentError::RequestFailed(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AgentError::RequestFailed(format!(
            "{} API error ({}): {}",
            provider, status, body
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AgentError::ParseError(e.to_string()))
}

fn text_at<'a>(json: &'a Value, pointer: &str, provider: &str) -> Result<&'a str, AgentError> {
    json.pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| AgentError::ParseError(format!("{provider} response missing {pointer}")))
}

/// Anthropic Messages API
pub struct ClaudeAgent {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl ClaudeAgent {
    pub const API_KEY_VAR: &'static str = "ANTHROPIC_API_KEY";

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Self {
        Self::new(api_key(Self::API_KEY_VAR), model)
    }

    pub fn request_body(&self, prompt: &str) -> Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "messages": [{
                "role": "user",
                "content": prompt
            }]
        })
    }

    pub fn parse_response(json: &Value) -> Result<String, AgentError> {
        text_at(json, "/content/0/text", "Claude").map(str::to_string)
    }
}

#[async_trait]
impl Agent for ClaudeAgent {
    fn name(&self) -> &str {
        "Claude"
    }

    fn available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        if !self.available() {
            return Err(AgentError::MissingApiKey(Self::API_KEY_VAR.to_string()));
        }
        let request = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01");
        let json = post_json(request, &self.request_body(prompt), "Claude").await?;
        Self::parse_response(&json)
    }
}

/// Google Gemini generateContent API
pub struct GeminiAgent {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiAgent {
    pub const API_KEY_VAR: &'static str = "GEMINI_API_KEY";

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Self {
        Self::new(api_key(Self::API_KEY_VAR), model)
    }

    pub fn request_body(&self, prompt: &str) -> Value {
        serde_json::json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": 0.3,
                "maxOutputTokens": MAX_OUTPUT_TOKENS
            }
        })
    }

    pub fn parse_response(json: &Value) -> Result<String, AgentError> {
        text_at(json, "/candidates/0/content/parts/0/text", "Gemini").map(str::to_string)
    }
}

#[async_trait]
impl Agent for GeminiAgent {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        if !self.available() {
            return Err(AgentError::MissingApiKey(Self::API_KEY_VAR.to_string()));
        }
        let url = format!("{}/{}:generateContent", GEMINI_URL, self.model);
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key);
        let json = post_json(request, &self.request_body(prompt), "Gemini").await?;
        Self::parse_response(&json)
    }
}

/// OpenAI Chat Completions API
pub struct CodexAgent {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl CodexAgent {
    pub const API_KEY_VAR: &'static str = "OPENAI_API_KEY";

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Self {
        Self::new(api_key(Self::API_KEY_VAR), model)
    }

    pub fn request_body(&self, prompt: &str) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": prompt
            }],
            "max_tokens": MAX_OUTPUT_TOKENS
        })
    }

    pub fn parse_response(json: &Value) -> Result<String, AgentError> {
        text_at(json, "/choices/0/message/content", "Codex").map(str::to_string)
    }
}

#[async_trait]
impl Agent for CodexAgent {
    fn name(&self) -> &str {
        "Codex"
    }

    fn available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        if !self.available() {
            return Err(AgentError::MissingApiKey(Self::API_KEY_VAR.to_string()));
        }
        let request = self.client.post(OPENAI_URL).bearer_auth(&self.api_key);
        let json = post_json(request, &self.request_body(prompt), "Codex").await?;
        Self::parse_response(&json)
    }
}

/// Claude, Gemini, Codex: the analysis panel and, in the same order, the
/// chairman priority list.
pub fn default_agents(models: &AgentModels) -> Vec<SharedAgent> {
    vec![
        Arc::new(ClaudeAgent::from_env(models.claude_model.clone())),
        Arc::new(GeminiAgent::from_env(models.gemini_model.clone())),
        Arc::new(CodexAgent::from_env(models.codex_model.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_availability_follows_api_key() {
        assert!(ClaudeAgent::new("sk-test", "m").available());
        assert!(!ClaudeAgent::new("", "m").available());
        assert!(!GeminiAgent::new("", "m").available());
        assert!(CodexAgent::new("key", "m").available());
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let err = GeminiAgent::new("", "gemini-1.5-pro").run("hi").await.unwrap_err();
        assert_eq!(err, AgentError::MissingApiKey("GEMINI_API_KEY".to_string()));
    }

    #[test]
    fn test_request_bodies_carry_model_and_prompt() {
        let claude = ClaudeAgent::new("k", "claude-x").request_body("review this");
        assert_eq!(claude["model"], "claude-x");
        assert_eq!(claude["messages"][0]["content"], "review this");

        let gemini = GeminiAgent::new("k", "gemini-x").request_body("review this");
        assert_eq!(gemini["contents"][0]["parts"][0]["text"], "review this");

        let codex = CodexAgent::new("k", "gpt-x").request_body("review this");
        assert_eq!(codex["model"], "gpt-x");
        assert_eq!(codex["messages"][0]["role"], "user");
    }

    #[test]
    fn test_parse_responses() {
        let claude = json!({"content": [{"type": "text", "text": "looks fine"}]});
        assert_eq!(ClaudeAgent::parse_response(&claude).unwrap(), "looks fine");

        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "ok"}]}}]});
        assert_eq!(GeminiAgent::parse_response(&gemini).unwrap(), "ok");

        let codex = json!({"choices": [{"message": {"role": "assistant", "content": "lgtm"}}]});
        assert_eq!(CodexAgent::parse_response(&codex).unwrap(), "lgtm");
    }

    #[test]
    fn test_parse_malformed_response() {
        let err = ClaudeAgent::parse_response(&json!({"error": "overloaded"})).unwrap_err();
        assert!(matches!(err, AgentError::ParseError(msg) if msg.contains("/content/0/text")));
    }

    #[test]
    fn test_default_agent_order() {
        let agents = default_agents(&AgentModels::default());
        let names: Vec<&str> = agents.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["Claude", "Gemini", "Codex"]);
    }
}
