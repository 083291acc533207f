use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: serde_json::Value,
}

/// One piece of a structured-generation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    /// A stored artifact the model should read, referenced by handle or URL.
    Document { uri: String, media_type: String },
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn pdf(uri: impl Into<String>) -> Self {
        Self::Document {
            uri: uri.into(),
            media_type: "application/pdf".to_string(),
        }
    }
}

/// Prompt plus target schema in, conforming JSON value out.
///
/// Implementations fail on transport errors, timeouts and unparsable output.
/// They never retry; a malformed structured result is a content defect.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate(&self, parts: &[PromptPart], schema: &serde_json::Value) -> Result<serde_json::Value>;
}

/// OpenAI-compatible chat completions client used in JSON-schema mode.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
        })
    }

    pub fn from_env() -> Result<Self> {
        let base_url = dotenv::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
        let model =
            dotenv::var("LLM_MODEL").unwrap_or_else(|_| "qwen/qwen3-8b".to_string());
        let api_key = dotenv::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
        Self::new(base_url, model, api_key)
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    fn render_parts(parts: &[PromptPart]) -> serde_json::Value {
        let content: Vec<serde_json::Value> = parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => serde_json::json!({ "type": "text", "text": text }),
                PromptPart::Document { uri, media_type } => serde_json::json!({
                    "type": "file",
                    "file": { "file_id": uri, "mime_type": media_type },
                }),
            })
            .collect();
        serde_json::Value::Array(content)
    }
}

#[async_trait]
impl StructuredGenerator for LlmClient {
    async fn generate(&self, parts: &[PromptPart], schema: &serde_json::Value) -> Result<serde_json::Value> {
        let messages = vec![Message {
            role: "user".to_string(),
            content: Self::render_parts(parts),
        }];
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": "result", "strict": true, "schema": schema },
            },
        });

        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req.send().await.context("LLM request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("Failed to read LLM response")?;
        if !status.is_success() {
            anyhow::bail!("LLM returned {}: {}", status, crate::error::truncate(&text, 200));
        }
        let json: serde_json::Value =
            serde_json::from_str(&text).context("Failed to parse LLM JSON")?;

        // Extract content from choices[0].message.content (handle null)
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or("");
        debug!(model = %self.model, content_len = content.len(), "structured generation returned");

        parse_structured(content)
    }
}

/// Parse model output as JSON, tolerating a surrounding markdown code fence.
pub fn parse_structured(content: &str) -> Result<serde_json::Value> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    if unfenced.is_empty() {
        anyhow::bail!("model returned empty output");
    }
    serde_json::from_str(unfenced).with_context(|| {
        format!(
            "model output is not valid JSON: {}",
            crate::error::truncate(unfenced, 200)
        )
    })
}
