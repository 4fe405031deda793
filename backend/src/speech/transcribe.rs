use futures::future::BoxFuture;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use super::SpeechError;
use super::listener::CapturedAudio;
use crate::config::SpeechConfig;

/// Turns captured audio into text.
pub trait Transcriber: Send + Sync {
    fn transcribe<'a>(&'a self, audio: &'a CapturedAudio) -> BoxFuture<'a, Result<String, SpeechError>>;
}

pub fn from_config(config: &SpeechConfig) -> Arc<dyn Transcriber> {
    match &config.transcription_url {
        Some(url) => {
            log::info!("Speech recognition via {}", url);
            Arc::new(HttpTranscriber::new(
                url.clone(),
                config.api_key.clone(),
                config.transcription_model.clone(),
            ))
        }
        None => {
            log::warn!("STT_URL is not set; speech input will be rejected");
            Arc::new(UnconfiguredTranscriber)
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for an OpenAI-compatible `audio/transcriptions` endpoint.
pub struct HttpTranscriber {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpTranscriber {
    pub fn new(url: String, api_key: Option<String>, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url,
            api_key,
            model,
        }
    }

    async fn request(&self, audio: &CapturedAudio) -> Result<String, SpeechError> {
        let wav = audio
            .to_wav()
            .map_err(|e| SpeechError::Service(format!("failed to encode audio: {}", e)))?;
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .map_err(service_error)?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(service_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Service(format!("{}: {}", status, body.trim())));
        }

        let body: TranscriptionResponse = response.json().await.map_err(service_error)?;
        let text = body.text.trim();
        if text.is_empty() {
            return Err(SpeechError::Unintelligible);
        }
        Ok(text.to_string())
    }
}

impl Transcriber for HttpTranscriber {
    fn transcribe<'a>(&'a self, audio: &'a CapturedAudio) -> BoxFuture<'a, Result<String, SpeechError>> {
        Box::pin(self.request(audio))
    }
}

pub struct UnconfiguredTranscriber;

impl Transcriber for UnconfiguredTranscriber {
    fn transcribe<'a>(&'a self, _audio: &'a CapturedAudio) -> BoxFuture<'a, Result<String, SpeechError>> {
        Box::pin(async {
            Err(SpeechError::Service(
                "no recognition service is configured".to_string(),
            ))
        })
    }
}

fn service_error(err: reqwest::Error) -> SpeechError {
    SpeechError::Service(err.to_string())
}
