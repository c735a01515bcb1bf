/// Audio Transcriber
///
/// Turns an arbitrary audio file into text through a remote speech-to-text
/// service: the audio is converted to canonical PCM, split into bounded
/// chunks, each chunk is recognized with one retry, and the partial results
/// are reassembled in order.

pub mod audio;
pub mod auth;
pub mod chunker;
pub mod config;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod recognition;
pub mod retry;

// Re-export main types for easy access
pub use crate::audio::{FfmpegNormalizer, Normalizer, PcmFormat};
pub use crate::auth::{Credential, CredentialManager, OAuthTokenSource, TokenSource};
pub use crate::chunker::{AudioChunk, Chunker};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{
    ChunkError, ChunkOpenError, ConversionError, CredentialError, FetchError, PipelineError, RecognitionError,
};
pub use crate::fetch::{FileMetadata, LargeFileRetriever};
pub use crate::pipeline::{ChunkResult, PipelineResult, Transcriber, WARNING_BANNER};
pub use crate::recognition::{RecognitionResponse, Recognizer, SpeechClient};
pub use crate::retry::{retry_in_passes, Attempt, RetryPolicy};
