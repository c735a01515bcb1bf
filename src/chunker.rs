//! Duration-bounded splitting of canonical PCM audio

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audio::PcmFormat;
use crate::error::ChunkOpenError;

pub const DEFAULT_MAX_DURATION_MS: u64 = 60_000;

/// One bounded-duration segment of the input audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChunk {
    /// Position in the input; the only key used for reassembly
    pub index: usize,
    pub path: PathBuf,
    pub offset_ms: u64,
    pub approx_duration_ms: u64,
}

impl AudioChunk {
    pub fn end_ms(&self) -> u64 {
        self.offset_ms + self.approx_duration_ms
    }

    /// Human-readable span, e.g. `01:00-01:30`
    pub fn span_label(&self) -> String {
        format!("{}-{}", format_timestamp(self.offset_ms), format_timestamp(self.end_ms()))
    }
}

fn format_timestamp(ms: u64) -> String {
    let total_secs = ms / 1000;
    let (hours, minutes, seconds) = (total_secs / 3600, (total_secs / 60) % 60, total_secs % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Splits raw PCM into contiguous windows of at most `max_duration_ms`
#[derive(Debug, Clone)]
pub struct Chunker {
    format: PcmFormat,
    max_duration_ms: u64,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(PcmFormat::CANONICAL, DEFAULT_MAX_DURATION_MS)
    }
}

impl Chunker {
    pub fn new(format: PcmFormat, max_duration_ms: u64) -> Self {
        Self {
            format,
            max_duration_ms,
        }
    }

    /// Number of windows covering `total_len` bytes of audio; counted in
    /// bytes so trailing frames shorter than a millisecond are not lost
    pub fn chunk_count(&self, total_len: u64) -> usize {
        let window_len = self.format.bytes_for_ms(self.max_duration_ms);
        if window_len == 0 || total_len <= window_len {
            1
        } else {
            total_len.div_ceil(window_len) as usize
        }
    }

    /// Open the stream and return its byte length, failing before any chunk is written
    async fn probe(&self, input: &Path) -> Result<u64, ChunkOpenError> {
        if self.format.sample_rate == 0 || self.format.frame_size() == 0 {
            return Err(ChunkOpenError::Attributes(format!("{:?}", self.format)));
        }
        if self.max_duration_ms == 0 {
            return Err(ChunkOpenError::Attributes("max chunk duration is zero".to_string()));
        }
        if self.format.bytes_for_ms(self.max_duration_ms) == 0 {
            return Err(ChunkOpenError::Attributes(format!(
                "{}ms is shorter than one frame",
                self.max_duration_ms
            )));
        }

        let metadata = tokio::fs::metadata(input)
            .await
            .map_err(|source| ChunkOpenError::Open {
                path: input.to_path_buf(),
                source,
            })?;

        let len = metadata.len();
        let frame = self.format.frame_size();
        if len == 0 {
            return Err(ChunkOpenError::Empty {
                path: input.to_path_buf(),
            });
        }
        if len % frame != 0 {
            return Err(ChunkOpenError::Misaligned {
                path: input.to_path_buf(),
                len,
                frame,
            });
        }

        Ok(len)
    }

    /// Split `input` into ordered chunks written to `output_dir`.
    ///
    /// Audio no longer than the threshold comes back as a single chunk that
    /// references `input` itself.
    pub async fn split(&self, input: &Path, output_dir: &Path) -> Result<Vec<AudioChunk>, ChunkOpenError> {
        let total_len = self.probe(input).await?;
        let total_ms = self.format.duration_ms(total_len);
        let window_len = self.format.bytes_for_ms(self.max_duration_ms);

        if total_len <= window_len {
            debug!("Audio is {}ms, no split needed", total_ms);
            return Ok(vec![AudioChunk {
                index: 0,
                path: input.to_path_buf(),
                offset_ms: 0,
                approx_duration_ms: total_ms,
            }]);
        }

        let count = self.chunk_count(total_len);

        info!(
            "✂️ Splitting {}ms of audio into {} chunks of {}ms",
            total_ms, count, self.max_duration_ms
        );

        let file = tokio::fs::File::open(input)
            .await
            .map_err(|source| ChunkOpenError::Open {
                path: input.to_path_buf(),
                source,
            })?;
        let mut reader = tokio::io::BufReader::new(file);

        let mut chunks = Vec::with_capacity(count);
        let mut consumed = 0u64;

        for index in 0..count {
            let chunk_len = window_len.min(total_len - consumed);
            let mut buffer = Vec::with_capacity(chunk_len as usize);
            (&mut reader)
                .take(chunk_len)
                .read_to_end(&mut buffer)
                .await
                .map_err(|source| ChunkOpenError::Write { index, source })?;

            let path = output_dir.join(format!("chunk_{}_{}.pcm", index, Uuid::new_v4()));
            let mut out = tokio::fs::File::create(&path)
                .await
                .map_err(|source| ChunkOpenError::Write { index, source })?;
            out.write_all(&buffer)
                .await
                .map_err(|source| ChunkOpenError::Write { index, source })?;
            out.flush()
                .await
                .map_err(|source| ChunkOpenError::Write { index, source })?;

            chunks.push(AudioChunk {
                index,
                path,
                offset_ms: self.format.duration_ms(consumed),
                approx_duration_ms: self.format.duration_ms(buffer.len() as u64),
            });
            consumed += buffer.len() as u64;
        }

        Ok(chunks)
    }
}
