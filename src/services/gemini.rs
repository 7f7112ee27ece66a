use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::models::job::ImagePayload;
use crate::services::removal::{RemovalError, WatermarkRemover};

/// Client for the Gemini image-editing `generateContent` endpoint.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
    prompt: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    #[serde(default)]
    data: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            prompt: prompt.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.gemini_base_url,
            &config.gemini_model,
            &config.gemini_api_key,
            &config.removal_prompt,
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl WatermarkRemover for GeminiClient {
    /// Send one image plus the removal instruction and return the edited image.
    async fn remove_watermark(&self, image: &ImagePayload) -> Result<Bytes, RemovalError> {
        let engine = base64::engine::general_purpose::STANDARD;

        let request_body = serde_json::json!({
            "contents": [{
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": image.mime_type(),
                            "data": engine.encode(image.bytes()),
                        }
                    },
                    { "text": self.prompt }
                ]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"]
            }
        });

        tracing::debug!(
            model = %self.model,
            mime_type = %image.mime_type(),
            input_bytes = image.len(),
            "Calling Gemini image edit"
        );

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?
            .error_for_status()?;

        let body: GenerateContentResponse = response.json().await?;

        // Only the first candidate counts; text-only answers are failures.
        let data = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.inline_data)
                    .find(|d| !d.data.is_empty())
            })
            .ok_or(RemovalError::NoImage)?;

        let bytes = engine.decode(data.data.as_bytes())?;
        if bytes.is_empty() {
            return Err(RemovalError::NoImage);
        }
        Ok(Bytes::from(bytes))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ENDPOINT: &str = "/v1beta/models/test-model:generateContent";

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(server.uri(), "test-model", "key-123", "strip it")
    }

    fn image() -> ImagePayload {
        ImagePayload::new(&b"\x89PNG input"[..], "image/png")
    }

    #[tokio::test]
    async fn test_returns_first_inline_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .and(header("x-goog-api-key", "key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {
                        "parts": [
                            { "text": "here you go" },
                            { "inlineData": { "mimeType": "image/png", "data": "Y2xlYW4=" } }
                        ]
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let out = client(&server).remove_watermark(&image()).await.unwrap();
        assert_eq!(&out[..], b"clean");
    }

    #[tokio::test]
    async fn test_text_only_response_is_no_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [{ "text": "I can't do that" }] } }]
            })))
            .mount(&server)
            .await;

        let err = client(&server).remove_watermark(&image()).await.unwrap_err();
        assert!(matches!(err, RemovalError::NoImage));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_no_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = client(&server).remove_watermark(&image()).await.unwrap_err();
        assert!(matches!(err, RemovalError::NoImage));
    }

    #[tokio::test]
    async fn test_http_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).remove_watermark(&image()).await.unwrap_err();
        assert!(matches!(err, RemovalError::Http(_)));
    }

    #[tokio::test]
    async fn test_bad_base64_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "inlineData": { "data": "***" } }] }
                }]
            })))
            .mount(&server)
            .await;

        let err = client(&server).remove_watermark(&image()).await.unwrap_err();
        assert!(matches!(err, RemovalError::Decode(_)));
    }
}
