use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{RecognitionResponse, Recognizer};
use crate::audio::PcmFormat;
use crate::config::SpeechConfig;
use crate::error::RecognitionError;

/// REST client for the synchronous recognition endpoint
pub struct SpeechClient {
    client: reqwest::Client,
    endpoint: String,
    language: String,
    model: String,
    format: PcmFormat,
}

impl SpeechClient {
    pub fn new(config: &SpeechConfig) -> Result<Self, RecognitionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.recognize_url.clone(),
            language: config.language.clone(),
            model: config.model.clone(),
            format: PcmFormat::CANONICAL,
        })
    }
}

#[async_trait]
impl Recognizer for SpeechClient {
    async fn recognize(&self, pcm: Vec<u8>, token: &str) -> Result<String, RecognitionError> {
        debug!(
            "Sending {} bytes to {} (language {}, model {})",
            pcm.len(),
            self.endpoint,
            self.language,
            self.model
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .header("Content-Type", self.format.content_type())
            .query(&[("language", self.language.as_str()), ("model", self.model.as_str())])
            .body(pcm)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RecognitionError::Status { status, body });
        }

        let body = response.text().await?;
        let text = RecognitionResponse::parse(&body)?.into_text();

        debug!("Recognized {} characters", text.len());
        Ok(text)
    }
}
