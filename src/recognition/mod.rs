pub mod client;
pub mod response;

use async_trait::async_trait;

use crate::error::RecognitionError;

pub use client::SpeechClient;
pub use response::RecognitionResponse;

/// Sends one canonical PCM payload for recognition
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Returns the recognized text; an empty string means nothing was recognized
    async fn recognize(&self, pcm: Vec<u8>, token: &str) -> Result<String, RecognitionError>;
}
