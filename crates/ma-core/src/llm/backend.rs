//! Text-generation backends
//!
//! Each backend issues exactly one HTTP request per call and classifies the
//! outcome; retry, demotion and fallback policy live in the strategies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::{BackendConfig, BackendKind};
use crate::error::{Error, GenerationError, Result};

use super::types::*;

const HUGGING_FACE_BASE_URL: &str = "https://api-inference.huggingface.co";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Capability: generate text from a prompt
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Human-readable backend name used in logs
    fn name(&self) -> &str;

    /// Issue one generation request
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<String, GenerationError>;
}

/// Hugging Face inference API backend
#[derive(Clone)]
pub struct HuggingFaceBackend {
    client: Client,
    api_key: String,
    model: String,
    url: String,
}

impl HuggingFaceBackend {
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| HUGGING_FACE_BASE_URL.to_string());
        let url = format!("{}/models/{}", base_url.trim_end_matches('/'), config.model);

        if config.api_key.is_empty() {
            warn!("Hugging Face API key is blank for model {}", config.model);
        }

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            url,
        })
    }
}

#[async_trait]
impl TextBackend for HuggingFaceBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<String, GenerationError> {
        debug!("Sending inference request to {}", self.url);

        let request = InferenceRequest {
            inputs: prompt,
            parameters: params,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(GenerationError::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(GenerationError::transport)?;

        debug!("Response code from {}: {}", self.model, status.as_u16());

        if !status.is_success() {
            return Err(GenerationError::from_status(status.as_u16(), body));
        }

        parse_inference_body(&body)
            .ok_or_else(|| GenerationError::InvalidResponse(truncate_body(&body)))
    }
}

/// Gemini `generateContent` backend (API key in the URL)
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
    url: String,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string());
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            config.model
        );

        if config.api_key.is_empty() {
            warn!("Gemini API key is blank for model {}", config.model);
        }

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            url,
        })
    }
}

#[async_trait]
impl TextBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> std::result::Result<String, GenerationError> {
        debug!("Sending generateContent request for {}", self.model);

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", self.api_key.as_str())])
            .json(&GeminiRequest::from_prompt(prompt))
            .send()
            .await
            .map_err(GenerationError::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(GenerationError::transport)?;

        if !status.is_success() {
            warn!("Gemini API error: {} - {}", status, truncate_body(&body));
            return Err(GenerationError::from_status(status.as_u16(), body));
        }

        parse_gemini_body(&body)
            .ok_or_else(|| GenerationError::InvalidResponse(truncate_body(&body)))
    }
}

/// Build a backend from its descriptor
pub fn build_backend(config: &BackendConfig, timeout: Duration) -> Result<Arc<dyn TextBackend>> {
    Ok(match config.kind {
        BackendKind::HuggingFace => Arc::new(HuggingFaceBackend::new(config, timeout)?),
        BackendKind::Gemini => Arc::new(GeminiBackend::new(config, timeout)?),
    })
}

fn truncate_body(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hf_config(server: &MockServer, model: &str) -> BackendConfig {
        BackendConfig {
            kind: BackendKind::HuggingFace,
            model: model.to_string(),
            api_key: "hf_test_key".to_string(),
            base_url: Some(server.uri()),
        }
    }

    #[tokio::test]
    async fn test_hugging_face_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/facebook/bart-large-cnn"))
            .and(header("authorization", "Bearer hf_test_key"))
            .and(body_partial_json(serde_json::json!({
                "inputs": "prompt text",
                "parameters": { "max_length": 200 }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"summary_text":"A summary."}]"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend =
            HuggingFaceBackend::new(&hf_config(&server, "facebook/bart-large-cnn"), Duration::from_secs(5))
                .unwrap();
        let text = backend
            .generate("prompt text", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, "A summary.");
    }

    #[tokio::test]
    async fn test_hugging_face_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/busy"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/broken"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
            .mount(&server)
            .await;

        let timeout = Duration::from_secs(5);
        let busy = HuggingFaceBackend::new(&hf_config(&server, "busy"), timeout).unwrap();
        let broken = HuggingFaceBackend::new(&hf_config(&server, "broken"), timeout).unwrap();
        let params = GenerationParams::default();

        assert_eq!(
            busy.generate("x", &params).await.unwrap_err(),
            GenerationError::ServiceUnavailable
        );
        assert_eq!(
            broken.generate("x", &params).await.unwrap_err(),
            GenerationError::Status {
                status: 400,
                body: "bad".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_hugging_face_invalid_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let backend =
            HuggingFaceBackend::new(&hf_config(&server, "m"), Duration::from_secs(5)).unwrap();
        let err = backend
            .generate("x", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_gemini_key_in_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "gm_key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"candidates":[{"content":{"parts":[{"text":"Thanks, I accept."}]}}]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let config = BackendConfig {
            kind: BackendKind::Gemini,
            model: "gemini-2.0-flash".to_string(),
            api_key: "gm_key".to_string(),
            base_url: Some(server.uri()),
        };
        let backend = build_backend(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(backend.name(), "gemini-2.0-flash");

        let text = backend
            .generate("Write a reply", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, "Thanks, I accept.");
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let config = BackendConfig {
            kind: BackendKind::HuggingFace,
            model: "m".to_string(),
            api_key: String::new(),
            // nothing listens on port 9 (discard)
            base_url: Some("http://127.0.0.1:9".to_string()),
        };
        let backend = HuggingFaceBackend::new(&config, Duration::from_secs(2)).unwrap();
        let err = backend
            .generate("x", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
    }
}
