//! Text-generation capability: trait, OpenAI-compatible HTTP client, mock

use crate::error::GenerationError;
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

/// Shared retry budget for one logical generation call.
pub const MAX_GENERATION_ATTEMPTS: u32 = 3;

/// Pluggable text-generation capability.
///
/// `generate_json` either returns a parsed JSON object or fails with
/// `SchemaInvalid`; it never hands malformed data to a stage.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Free-text completion.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// JSON-object completion.
    async fn generate_json(&self, prompt: &str) -> Result<Value, GenerationError>;
}

/// Retry wrapper for free-text generation: up to 3 attempts, 2s/4s/6s waits
/// on rate limits, 1s otherwise. Callers apply their own fallback once the
/// budget is exhausted.
pub async fn generate_text_with_retry(
    generator: &dyn Generator,
    limiter: &RateLimiter,
    prompt: &str,
) -> Result<String, GenerationError> {
    for attempt in 1..=MAX_GENERATION_ATTEMPTS {
        limiter.acquire().await;
        match generator.generate(prompt).await {
            Ok(text) => return Ok(text),
            Err(err) if attempt < MAX_GENERATION_ATTEMPTS => {
                let wait = backoff_for(&err, attempt);
                warn!(
                    "generation attempt {attempt}/{MAX_GENERATION_ATTEMPTS} failed ({err}), retrying in {wait:?}"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("retry loop always returns")
}

/// Retry wrapper for JSON-object generation, same policy as
/// [`generate_text_with_retry`].
pub async fn generate_json_with_retry(
    generator: &dyn Generator,
    limiter: &RateLimiter,
    prompt: &str,
) -> Result<Value, GenerationError> {
    for attempt in 1..=MAX_GENERATION_ATTEMPTS {
        limiter.acquire().await;
        match generator.generate_json(prompt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_GENERATION_ATTEMPTS => {
                let wait = backoff_for(&err, attempt);
                warn!(
                    "structured generation attempt {attempt}/{MAX_GENERATION_ATTEMPTS} failed ({err}), retrying in {wait:?}"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("retry loop always returns")
}

fn backoff_for(err: &GenerationError, attempt: u32) -> Duration {
    if err.is_rate_limited() {
        Duration::from_secs(2 * u64::from(attempt))
    } else {
        Duration::from_secs(1)
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible HTTP client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// Client for any chat-completions endpoint speaking the OpenAI wire format.
pub struct HttpGenerator {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl HttpGenerator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.6,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn complete(&self, prompt: &str, json_mode: bool) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || body.to_lowercase().contains("rate limit") {
                return Err(GenerationError::RateLimited(format!("{status}: {body}")));
            }
            return Err(GenerationError::Http(format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        debug!("completion of {} chars from {url}", content.len());
        Ok(content)
    }

    /// Probe the endpoint's model listing, used by the server binary at boot.
    pub async fn health_check(&self) -> Result<bool, GenerationError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    fn name(&self) -> &'static str {
        "http_chat"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.complete(prompt, false).await
    }

    async fn generate_json(&self, prompt: &str) -> Result<Value, GenerationError> {
        let text = self.complete(prompt, true).await?;
        parse_json_object(&text)
    }
}

/// Parse a completion into a JSON object, tolerating markdown code fences.
fn parse_json_object(text: &str) -> Result<Value, GenerationError> {
    let trimmed = text.trim();
    let candidate = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    let value: Value = serde_json::from_str(candidate)
        .map_err(|e| GenerationError::SchemaInvalid(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(GenerationError::SchemaInvalid(format!(
            "expected a JSON object, got {}",
            kind_of(&value)
        )))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Mock generator for tests
// ---------------------------------------------------------------------------

/// Mock generator used by the workflow tests.
///
/// Routes on the stable role lines from the prompt templates; evaluation
/// prompts pop scripted scores (the last one repeats once the script runs
/// dry). Every prompt is logged so tests can count stage invocations.
pub struct MockGenerator {
    fail_all: bool,
    scores: std::sync::Mutex<VecDeque<i64>>,
    fusion_calls: std::sync::Mutex<u32>,
    prompts: std::sync::Mutex<Vec<String>>,
}

impl MockGenerator {
    /// Happy-path mock: everything succeeds, evaluations score 8.
    pub fn new() -> Self {
        Self::with_scores(vec![8])
    }

    /// Evaluation calls emit these scores in order; the last repeats.
    pub fn with_scores(scores: Vec<i64>) -> Self {
        Self {
            fail_all: false,
            scores: std::sync::Mutex::new(scores.into_iter().collect()),
            fusion_calls: std::sync::Mutex::new(0),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with a transport error.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            scores: std::sync::Mutex::new(VecDeque::new()),
            fusion_calls: std::sync::Mutex::new(0),
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Every prompt seen so far, in call order.
    pub fn prompt_log(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log lock").clone()
    }

    /// Number of logged prompts containing `marker`.
    pub fn calls_containing(&self, marker: &str) -> usize {
        self.prompt_log()
            .iter()
            .filter(|p| p.contains(marker))
            .count()
    }

    fn record(&self, prompt: &str) {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .push(prompt.to_string());
    }

    fn next_score(&self) -> i64 {
        let mut scores = self.scores.lock().expect("score lock");
        if scores.len() > 1 {
            scores.pop_front().unwrap_or(8)
        } else {
            scores.front().copied().unwrap_or(8)
        }
    }

    fn term_from_prompt(prompt: &str) -> String {
        prompt
            .split_once("Term: \"")
            .and_then(|(_, rest)| rest.split_once('"'))
            .map(|(term, _)| term.to_string())
            .unwrap_or_else(|| "unknown term".to_string())
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.record(prompt);
        if self.fail_all {
            return Err(GenerationError::Http("mock generator offline".to_string()));
        }
        if prompt.contains(crate::prompts::BACK_TRANSLATION_ROLE) {
            return Ok("mock back-translation of the draft".to_string());
        }
        if prompt.contains(crate::prompts::REFINE_ROLE) {
            return Ok("mock refined translation".to_string());
        }
        let mut calls = self.fusion_calls.lock().expect("fusion counter lock");
        *calls += 1;
        Ok(format!("mock translation v{}", *calls))
    }

    async fn generate_json(&self, prompt: &str) -> Result<Value, GenerationError> {
        self.record(prompt);
        if self.fail_all {
            return Err(GenerationError::Http("mock generator offline".to_string()));
        }
        if prompt.contains(crate::prompts::STYLE_ROLE) {
            return Ok(serde_json::json!({
                "domain": "technical",
                "tone": "formal",
                "complexity": "medium"
            }));
        }
        if prompt.contains(crate::prompts::TERMS_ROLE) {
            return Ok(serde_json::json!({ "terms": ["neural network"] }));
        }
        if prompt.contains(crate::prompts::CONSOLIDATE_ROLE) {
            let term = Self::term_from_prompt(prompt);
            return Ok(serde_json::json!({
                "src": term,
                "suggested_translation": format!("{term} (translated)"),
                "type": "DomainTerm",
                "context_meaning": "mock meaning",
                "rationale": "mock rationale"
            }));
        }
        if prompt.contains(crate::prompts::EVALUATION_ROLE) {
            let score = self.next_score();
            return Ok(serde_json::json!({
                "score": score,
                "pass_flag": score >= 7,
                "critique": format!("mock critique at score {score}"),
                "error_types": ["accuracy"],
                "specific_issues": ["mock issue"],
                "improvement_suggestions": ["mock suggestion"]
            }));
        }
        Err(GenerationError::SchemaInvalid(
            "mock has no scripted reply for this prompt".to_string(),
        ))
    }
}
