//! Wire types for the text-generation backends

use serde::{Deserialize, Serialize};

/// Generation parameters sent to Hugging Face summarization models
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub max_length: u32,
    pub min_length: u32,
    pub do_sample: bool,
    pub temperature: f32,
    pub num_beams: u32,
    pub no_repeat_ngram_size: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: 200,
            min_length: 50,
            do_sample: false,
            temperature: 0.3,
            num_beams: 4,
            no_repeat_ngram_size: 3,
        }
    }
}

/// Hugging Face inference request: `{ inputs, parameters }`
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest<'a> {
    pub inputs: &'a str,
    pub parameters: &'a GenerationParams,
}

/// One element of a Hugging Face inference response array
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceOutput {
    #[serde(default)]
    pub summary_text: Option<String>,
    #[serde(default)]
    pub generated_text: Option<String>,
}

impl InferenceOutput {
    pub fn text(&self) -> Option<&str> {
        self.summary_text
            .as_deref()
            .or(self.generated_text.as_deref())
    }
}

/// Gemini `generateContent` request: `{ contents: [{ parts: [{ text }] }] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
}

impl GeminiRequest {
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Gemini `generateContent` response
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
}

impl GeminiResponse {
    /// Text of the first part of the first candidate
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

/// Normalize a Hugging Face body (`[{summary_text}]`, `[{generated_text}]`
/// or a bare object) into its text.
pub fn parse_inference_body(body: &str) -> Option<String> {
    if let Ok(outputs) = serde_json::from_str::<Vec<InferenceOutput>>(body) {
        return outputs.first().and_then(|o| o.text()).map(str::to_string);
    }
    serde_json::from_str::<InferenceOutput>(body)
        .ok()
        .and_then(|o| o.text().map(str::to_string))
}

/// Normalize a Gemini body into its text.
pub fn parse_gemini_body(body: &str) -> Option<String> {
    serde_json::from_str::<GeminiResponse>(body)
        .ok()
        .and_then(|r| r.first_text().map(str::to_string))
}
