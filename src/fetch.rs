//! Fallback download for files the primary fetch path rejects as oversized.
//!
//! The direct-URL path relies on undocumented file-hosting behaviour and may
//! fail for files that are nominally retrievable. Callers treat any
//! [`FetchError`] from here as an expected, reportable outcome.

use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TelegramConfig;
use crate::error::FetchError;

/// Write buffer used while streaming a download to disk
pub const DOWNLOAD_BUFFER_SIZE: usize = 8192;

/// Marker the hosting API puts in its description when a file exceeds the download limit
const TOO_BIG_MARKER: &str = "file is too big";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// File metadata returned by the hosting API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Path relative to the file download base
    #[serde(default)]
    pub file_path: Option<String>,
}

fn interpret_metadata(body: &str) -> Result<FileMetadata, FetchError> {
    let response: ApiResponse<FileMetadata> = serde_json::from_str(body)
        .map_err(|e| FetchError::Api(format!("unreadable metadata response: {}", e)))?;

    if !response.ok {
        let description = response
            .description
            .unwrap_or_else(|| "unknown error".to_string());
        if description.to_lowercase().contains(TOO_BIG_MARKER) {
            return Err(FetchError::TooLarge(description));
        }
        return Err(FetchError::Api(description));
    }

    response
        .result
        .ok_or_else(|| FetchError::Api("metadata response has no result".to_string()))
}

/// Downloads oversized files from the Telegram Bot API
pub struct LargeFileRetriever {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl LargeFileRetriever {
    pub fn new(config: &TelegramConfig) -> Result<Self, FetchError> {
        let bot_token = config
            .bot_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or(FetchError::MissingBotToken)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path)
    }

    /// Strip the bot token before a URL reaches logs or errors
    fn redact(&self, url: &str) -> String {
        url.replace(&self.bot_token, "<token>")
    }

    /// Query file metadata by id
    pub async fn file_metadata(&self, file_id: &str) -> Result<FileMetadata, FetchError> {
        debug!("Requesting metadata for file {}", file_id);

        // error descriptions come back as JSON with a non-2xx status, so the body is read either way
        let body = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(|e| e.without_url())?
            .text()
            .await
            .map_err(|e| e.without_url())?;

        interpret_metadata(&body)
    }

    /// Materialize `file_id` under `dest_dir` and return the local path
    pub async fn fetch_oversized(&self, file_id: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        tokio::fs::create_dir_all(dest_dir).await?;

        match self.file_metadata(file_id).await {
            Ok(metadata) => {
                let file_path = metadata
                    .file_path
                    .ok_or_else(|| FetchError::Api(format!("no file path for {}", file_id)))?;
                let dest = dest_dir.join(local_name(&file_path));

                info!("📥 Downloading {} ({:?} bytes)", file_path, metadata.file_size);
                self.download(&self.file_url(&file_path), &dest).await?;
                Ok(dest)
            }
            Err(FetchError::TooLarge(description)) => {
                warn!("Metadata rejected {} as too large, trying direct download", file_id);
                let dest = dest_dir.join(local_name(file_id));

                match self.download(&self.file_url(file_id), &dest).await {
                    Ok(_) => Ok(dest),
                    Err(e) => {
                        warn!("Direct download of {} failed: {}", file_id, e);
                        Err(FetchError::TooLarge(description))
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Stream `url` into `dest`, removing the partial file on failure
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let result = self.stream_to_file(url, dest).await;
        match &result {
            Ok(written) => info!("✅ Saved {} bytes to {}", written, dest.display()),
            Err(_) => {
                let _ = tokio::fs::remove_file(dest).await;
            }
        }
        result
    }

    async fn stream_to_file(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.without_url())?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: self.redact(url),
            });
        }

        let file = tokio::fs::File::create(dest).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFFER_SIZE, file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| e.without_url())?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        writer.flush().await?;
        Ok(written)
    }
}

/// Fresh local file name keeping the remote extension
fn local_name(remote: &str) -> String {
    let extension = Path::new(remote)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin");
    format!("{}.{}", Uuid::new_v4(), extension)
}
