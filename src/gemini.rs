use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default model id for this deployment, overridable via GEMINI_MODEL.
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-2xx reply from the API. The body is carried verbatim so the
    /// upstream wording ("API key not valid", "quota exceeded", ...) stays
    /// visible to the error classifier.
    #[error("upstream API error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Base64-encoded payload paired with its resolved MIME type, matching the
/// Gemini `inline_data` content part.
#[derive(Debug, Clone)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl InlineData {
    pub fn encode(mime_type: String, bytes: &[u8]) -> Self {
        InlineData {
            mime_type,
            data: STANDARD.encode(bytes),
        }
    }
}

/// Seam between the request pipeline and the hosted model, so tests can
/// substitute canned replies and the model tier can be swapped without
/// touching the handler.
#[async_trait]
pub trait AnalysisModel: Send + Sync {
    /// One synchronous generation call: prompt plus one inline payload in,
    /// raw text reply out. No retries, no streaming.
    async fn generate(&self, prompt: &str, part: &InlineData) -> Result<String, ModelError>;
}

/// Thin client for the Gemini `generateContent` REST endpoint. Stateless
/// between calls; constructed once at startup and shared read-only.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        GeminiClient {
            http: Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl AnalysisModel for GeminiClient {
    async fn generate(&self, prompt: &str, part: &InlineData) -> Result<String, ModelError> {
        let payload = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    {
                        "inline_data": {
                            "mime_type": part.mime_type,
                            "data": part.data
                        }
                    }
                ]
            }]
        });

        info!("Calling Gemini model {}", self.model);

        let response = self
            .http
            .post(format!(
                "{}/{}:generateContent?key={}",
                GEMINI_ENDPOINT, self.model, self.api_key
            ))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let body: Value = response.json().await?;

        // A reply with no text candidates is handed to the parse/fallback
        // path as an empty string rather than treated as an invocation error.
        Ok(body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}
