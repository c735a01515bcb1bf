use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audio::{FfmpegNormalizer, Normalizer, PcmFormat};
use crate::auth::CredentialManager;
use crate::chunker::{AudioChunk, Chunker};
use crate::config::Config;
use crate::error::{ChunkError, PipelineError, RecognitionError};
use crate::recognition::{Recognizer, SpeechClient};
use crate::retry::{retry_in_passes, Attempt, RetryPolicy};

/// Appended to the transcript when some chunks could not be recognized
pub const WARNING_BANNER: &str = "[Warning: some portions of the audio could not be recognized]";

/// Final outcome for one chunk; exactly one of `text` and `error` is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub index: usize,
    pub text: Option<String>,
    pub error: Option<String>,
}

impl ChunkResult {
    pub fn recognized(index: usize, text: String) -> Self {
        Self {
            index,
            text: Some(text),
            error: None,
        }
    }

    pub fn failed(index: usize, error: String) -> Self {
        Self {
            index,
            text: None,
            error: Some(error),
        }
    }
}

/// Transcript plus descriptions of the portions that could not be recognized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub transcript: String,
    pub failures: Vec<String>,
}

impl PipelineResult {
    /// True when every chunk was recognized
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Join chunk results in index order into a [`PipelineResult`]
pub fn aggregate(results: &[ChunkResult]) -> PipelineResult {
    let mut ordered: Vec<&ChunkResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.index);

    let mut transcript = ordered
        .iter()
        .filter_map(|r| r.text.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let failures: Vec<String> = ordered.iter().filter_map(|r| r.error.clone()).collect();

    if !failures.is_empty() {
        if !transcript.is_empty() {
            transcript.push(' ');
        }
        transcript.push_str(WARNING_BANNER);
    }

    PipelineResult {
        transcript,
        failures,
    }
}

fn describe_failure(chunk: &AudioChunk, error: &ChunkError) -> String {
    format!(
        "Chunk {} ({}) was not recognized: {}",
        chunk.index + 1,
        chunk.span_label(),
        error
    )
}

/// Normalize, chunk, recognize with retry and aggregate.
///
/// One `Transcriber` can serve many concurrent [`transcribe`](Self::transcribe)
/// calls; each call works in its own temporary directory and processes its
/// chunks sequentially.
pub struct Transcriber {
    credentials: Arc<CredentialManager>,
    normalizer: Arc<dyn Normalizer>,
    recognizer: Arc<dyn Recognizer>,
    chunker: Chunker,
    retry: RetryPolicy,
    temp_root: PathBuf,
}

impl Transcriber {
    pub fn new(
        credentials: Arc<CredentialManager>,
        normalizer: Arc<dyn Normalizer>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        Self {
            credentials,
            normalizer,
            recognizer,
            chunker: Chunker::default(),
            retry: RetryPolicy::default(),
            temp_root: std::env::temp_dir(),
        }
    }

    /// Wire the production collaborators from configuration
    pub fn from_config(config: &Config, credentials: Arc<CredentialManager>) -> Result<Self, RecognitionError> {
        let normalizer = FfmpegNormalizer::new(config.audio.ffmpeg_path.clone());
        let recognizer = SpeechClient::new(&config.speech)?;

        Ok(Self::new(credentials, Arc::new(normalizer), Arc::new(recognizer))
            .with_chunker(Chunker::new(PcmFormat::CANONICAL, config.audio.max_chunk_duration_ms))
            .with_retry(RetryPolicy::new(config.pipeline.max_attempts))
            .with_temp_root(config.pipeline.temp_dir.clone()))
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_temp_root(mut self, temp_root: PathBuf) -> Self {
        self.temp_root = temp_root;
        self
    }

    /// Transcribe a local audio file.
    ///
    /// Fails only when no chunk could be attempted at all (credentials,
    /// conversion or splitting); per-chunk failures end up in
    /// [`PipelineResult::failures`].
    pub async fn transcribe(&self, input: &Path) -> Result<PipelineResult, PipelineError> {
        let start_time = Instant::now();
        info!("🎤 Transcribing {}", input.display());

        tokio::fs::create_dir_all(&self.temp_root).await?;
        let workdir = tempfile::Builder::new()
            .prefix("transcribe-")
            .tempdir_in(&self.temp_root)?;
        debug!("Work directory: {}", workdir.path().display());

        let result = self.run(input, workdir.path()).await;

        if let Err(e) = workdir.close() {
            warn!("Failed to remove work directory: {}", e);
        }

        if let Ok(result) = &result {
            info!(
                "🎉 Transcription finished in {:.1}s: {} characters, {} failed chunks",
                start_time.elapsed().as_secs_f64(),
                result.transcript.len(),
                result.failures.len()
            );
        }

        result
    }

    async fn run(&self, input: &Path, workdir: &Path) -> Result<PipelineResult, PipelineError> {
        // fail fast before any conversion work
        self.credentials.get_token().await?;

        // normalized once up front, so every chunk is already canonical PCM
        let pcm_path = self.normalizer.normalize(input, workdir).await?;
        let chunks = self.chunker.split(&pcm_path, workdir).await?;
        let total = chunks.len();

        if chunks.iter().all(|chunk| chunk.path != pcm_path) {
            if let Err(e) = tokio::fs::remove_file(&pcm_path).await {
                warn!("Failed to remove {}: {}", pcm_path.display(), e);
            }
        }

        info!("📦 Recognizing {} chunk(s)", total);

        let outcomes = retry_in_passes(chunks, self.retry, move |chunk, attempt| {
            self.attempt_chunk(chunk, attempt, total)
        })
        .await;

        let results: Vec<ChunkResult> = outcomes
            .into_iter()
            .map(|(chunk, outcome)| match outcome {
                Ok(text) => ChunkResult::recognized(chunk.index, text),
                Err(e) => ChunkResult::failed(chunk.index, describe_failure(&chunk, &e)),
            })
            .collect();

        Ok(aggregate(&results))
    }

    async fn attempt_chunk(&self, chunk: AudioChunk, attempt: Attempt, total: usize) -> Result<String, ChunkError> {
        if !attempt.is_first() {
            info!("🔁 Retrying chunk {}/{} (attempt {})", chunk.index + 1, total, attempt.number);
        }

        let result = self.recognize_chunk(&chunk).await;

        match &result {
            Ok(text) => {
                debug!("Chunk {}/{} recognized: {} characters", chunk.index + 1, total, text.len());
                self.discard(&chunk).await;
            }
            Err(e) if attempt.is_last() => {
                error!("❌ Chunk {}/{} failed after {} attempts: {}", chunk.index + 1, total, attempt.number, e);
                self.discard(&chunk).await;
            }
            Err(e) => {
                warn!("Chunk {}/{} failed, will retry: {}", chunk.index + 1, total, e);
            }
        }

        result
    }

    async fn recognize_chunk(&self, chunk: &AudioChunk) -> Result<String, ChunkError> {
        let pcm = tokio::fs::read(&chunk.path).await?;
        let credential = self.credentials.get_token().await?;
        Ok(self.recognizer.recognize(pcm, &credential.token).await?)
    }

    async fn discard(&self, chunk: &AudioChunk) {
        match tokio::fs::remove_file(&chunk.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", chunk.path.display(), e),
        }
    }
}
