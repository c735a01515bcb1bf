use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::ConversionError;

/// Longest stderr excerpt kept in a conversion error
const STDERR_TAIL_BYTES: usize = 2048;

/// Layout of a raw PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
}

impl PcmFormat {
    /// Mono, 16 kHz, 16-bit signed little-endian
    pub const CANONICAL: PcmFormat = PcmFormat {
        sample_rate: 16_000,
        channels: 1,
        bytes_per_sample: 2,
    };

    /// Bytes per frame (one sample for every channel)
    pub fn frame_size(&self) -> u64 {
        u64::from(self.channels) * u64::from(self.bytes_per_sample)
    }

    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * self.frame_size()
    }

    /// Byte length of `ms` milliseconds, rounded down to whole frames
    pub fn bytes_for_ms(&self, ms: u64) -> u64 {
        let frames = u64::from(self.sample_rate) * ms / 1000;
        frames * self.frame_size()
    }

    /// Duration in milliseconds of `len` bytes
    pub fn duration_ms(&self, len: u64) -> u64 {
        let bytes_per_second = self.bytes_per_second();
        if bytes_per_second == 0 {
            return 0;
        }
        len * 1000 / bytes_per_second
    }

    /// MIME type understood by the recognition endpoint
    pub fn content_type(&self) -> String {
        format!(
            "audio/x-pcm;bit={};rate={}",
            u32::from(self.bytes_per_sample) * 8,
            self.sample_rate
        )
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::CANONICAL
    }
}

/// Converts arbitrary input audio into canonical PCM
#[async_trait]
pub trait Normalizer: Send + Sync {
    /// Write a canonical PCM copy of `input` into `output_dir` and return its path
    async fn normalize(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError>;
}

/// Normalizer backed by the ffmpeg command-line tool
#[derive(Debug, Clone)]
pub struct FfmpegNormalizer {
    binary: PathBuf,
    format: PcmFormat,
}

impl Default for FfmpegNormalizer {
    fn default() -> Self {
        Self::new(PathBuf::from("ffmpeg"))
    }
}

impl FfmpegNormalizer {
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            format: PcmFormat::CANONICAL,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Arguments for one conversion, input and output included
    pub fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-vn".to_string(), // No video stream
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-ac".to_string(),
            self.format.channels.to_string(),
            "-ar".to_string(),
            self.format.sample_rate.to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }

    /// Check that the codec tool can be started
    pub async fn check_available(&self) -> bool {
        tokio::process::Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Normalizer for FfmpegNormalizer {
    async fn normalize(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError> {
        if input.file_name().is_none() {
            return Err(ConversionError::InvalidPath(input.to_path_buf()));
        }

        let output_path = output_dir.join(format!("{}.pcm", Uuid::new_v4()));
        let tool = self.binary.display().to_string();

        info!("🎵 Converting {} to canonical PCM", input.display());
        debug!("Running {} {:?}", tool, self.build_args(input, &output_path));

        let output = tokio::process::Command::new(&self.binary)
            .args(self.build_args(input, &output_path))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ConversionError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            error!("Audio conversion failed for {}: {}", input.display(), stderr);
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(ConversionError::Failed {
                tool,
                input: input.to_path_buf(),
                status: output.status.to_string(),
                stderr,
            });
        }

        debug!("✅ Converted audio written to {}", output_path.display());
        Ok(output_path)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
