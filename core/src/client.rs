use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::chat::ChatProvider;
use crate::config::GeminiConfig;
use crate::errors::{GeminiError, GeminiResult};
use crate::types::*;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for interacting with the Gemini API
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model_name: String,
    generation: GenerationConfig,
}

impl GeminiClient {
    /// Create a new Gemini API client
    pub fn new(config: &GeminiConfig) -> GeminiResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                GeminiError::ConfigError(
                    "API key is required to initialize the Gemini client".to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GeminiError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model_name: normalize_model_name(&config.model_name),
            generation: GenerationConfig {
                temperature: config.temperature,
                top_p: config.top_p,
                top_k: config.top_k,
                max_output_tokens: config.max_output_tokens,
            },
        })
    }

    /// Same credentials, different model
    pub fn with_model(&self, model_name: &str) -> Self {
        Self {
            model_name: normalize_model_name(model_name),
            ..self.clone()
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            API_BASE, self.model_name, self.api_key
        )
    }

    /// Generate content using the Gemini API
    pub async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> GeminiResult<GenerateContentResponse> {
        let response = self
            .client
            .post(self.generate_url())
            .json(request)
            .send()
            .await
            .map_err(|e| GeminiError::RequestError(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.map_err(|e| {
                GeminiError::ResponseError(format!("Failed to read error response: {}", e))
            })?;
            return Err(http_error(status.as_u16(), &error_body));
        }

        let response_body = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| GeminiError::ParsingError(format!("Failed to parse response: {}", e)))?;

        Ok(response_body)
    }

    /// Builds a request carrying the whole conversation so far
    pub fn build_request(&self, history: &[Content]) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: history.to_vec(),
            safety_settings: permissive_safety_settings(),
            generation_config: Some(self.generation.clone()),
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    async fn list_models(&self) -> GeminiResult<Vec<String>> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}/models", API_BASE))
                .query(&[("key", self.api_key.as_str()), ("pageSize", "100")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await.map_err(|e| {
                GeminiError::RequestError(format!("Failed to list models: {}", e))
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(http_error(status.as_u16(), &body));
            }

            let page = response
                .json::<ListModelsResponse>()
                .await
                .map_err(|e| GeminiError::ParsingError(format!("Failed to parse model list: {}", e)))?;

            names.extend(
                page.models
                    .iter()
                    .filter(|m| m.supports_chat())
                    .map(|m| m.name.clone()),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = names.len(), "Listed chat-capable models");
        Ok(names)
    }

    async fn generate(&self, history: &[Content]) -> GeminiResult<String> {
        debug!(model = %self.model_name, turns = history.len(), "Generating reply");
        let request = self.build_request(history);
        let response = self.generate_content(&request).await?;
        extract_text_from_response(&response)
    }
}

/// Pulls the reply text out of the first candidate
pub fn extract_text_from_response(response: &GenerateContentResponse) -> GeminiResult<String> {
    let Some(candidate) = response.candidates.first() else {
        let reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
            .unwrap_or_else(|| "no candidates in response".to_string());
        return Err(GeminiError::ResponseError(format!("Empty response: {}", reason)));
    };

    let content = candidate
        .content
        .as_ref()
        .ok_or_else(|| GeminiError::ResponseError("No content in candidate".to_string()))?;

    let text = content.text();
    if text.is_empty() {
        if let Some(reason) = &candidate.finish_reason {
            warn!(finish_reason = %reason, "Candidate finished without text");
        }
        return Err(GeminiError::ResponseError("No text in candidate".to_string()));
    }

    Ok(text)
}

fn http_error(status_code: u16, body: &str) -> GeminiError {
    let message = match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => format!("{} ({})", envelope.error.message, envelope.error.status),
        Err(_) => format!("API request failed: {}", body),
    };
    GeminiError::HttpError {
        status_code,
        message,
    }
}

/// Accepts both `gemini-1.5-flash` and the listing form `models/gemini-1.5-flash`
pub fn normalize_model_name(name: &str) -> String {
    name.trim().trim_start_matches("models/").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GeminiConfig {
        GeminiConfig {
            api_key: Some("test-key".to_string()),
            model_name: "models/gemini-1.5-flash".to_string(),
            temperature: Some(0.9),
            top_p: Some(0.95),
            top_k: None,
            max_output_tokens: Some(512),
        }
    }

    #[test]
    fn test_new_requires_api_key() {
        let mut cfg = config();
        cfg.api_key = Some("  ".to_string());
        assert!(matches!(
            GeminiClient::new(&cfg),
            Err(GeminiError::ConfigError(_))
        ));
    }

    #[test]
    fn test_model_name_is_normalized() {
        let client = GeminiClient::new(&config()).unwrap();
        assert_eq!(client.model_name(), "gemini-1.5-flash");
        assert!(client
            .generate_url()
            .contains("/models/gemini-1.5-flash:generateContent?key=test-key"));

        let other = client.with_model("models/gemini-2.0-flash");
        assert_eq!(other.model_name(), "gemini-2.0-flash");
    }

    #[test]
    fn test_build_request_is_permissive() {
        let client = GeminiClient::new(&config()).unwrap();
        let request = client.build_request(&[Content::user("seed"), Content::model("Ready.")]);
        assert_eq!(request.contents.len(), 2);
        assert_eq!(request.safety_settings.len(), 4);
        assert!(request
            .safety_settings
            .iter()
            .all(|s| s.threshold == HarmBlockThreshold::BlockNone));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 512);
        assert_eq!(json["generationConfig"]["topP"], 0.95f32 as f64);
        assert!(json["generationConfig"].get("topK").is_none());
    }

    #[test]
    fn test_http_error_reads_envelope() {
        let err = http_error(
            429,
            r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#,
        );
        match err {
            GeminiError::HttpError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 429);
                assert_eq!(message, "Quota exceeded (RESOURCE_EXHAUSTED)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_extract_text_reports_block_reason() {
        let response: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#).unwrap();
        let err = extract_text_from_response(&response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));

        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"role": "model", "parts": [{"text": "..."}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text_from_response(&response).unwrap(), "...");
    }
}
