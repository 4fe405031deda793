use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::ChatError;
use crate::config::ChatConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Produces the assistant's reply to one user utterance.
pub trait ResponseGenerator: Send + Sync {
    fn generate<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<String, ChatError>>;
}

pub fn from_config(config: &ChatConfig) -> Arc<dyn ResponseGenerator> {
    match &config.gemini_api_key {
        Some(key) => {
            log::info!("Chat replies from Gemini model {}", config.gemini_model);
            Arc::new(GeminiGenerator::new(key.clone(), config.gemini_model.clone()))
        }
        None => {
            log::warn!("GEMINI_API_KEY is not set; chat replies are echoed");
            Arc::new(EchoGenerator)
        }
    }
}

/// Stand-in used when no conversational backend is configured.
pub struct EchoGenerator;

impl ResponseGenerator for EchoGenerator {
    fn generate<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<String, ChatError>> {
        Box::pin(async move { Ok(format!("AI response to: {}", input)) })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Google Generative Language `generateContent` client.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(GEMINI_BASE_URL.to_string(), api_key, model)
    }

    pub fn with_base_url(base_url: String, api_key: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    async fn request(&self, input: &str) -> Result<String, ChatError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: input }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChatError::Generation(format!("{}: {}", status, detail.trim())));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Generation(e.to_string()))?;
        extract_text(parsed)
    }
}

impl ResponseGenerator for GeminiGenerator {
    fn generate<'a>(&'a self, input: &'a str) -> BoxFuture<'a, Result<String, ChatError>> {
        Box::pin(self.request(input))
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, ChatError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ChatError::Generation("model returned no text".to_string()));
    }
    Ok(text)
}
