//! Error taxonomy for the transcription pipeline

use std::path::PathBuf;

/// Token acquisition failed
#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed token response: {0}")]
    Malformed(String),

    #[error("client key is not configured")]
    MissingClientKey,
}

/// The codec tool could not produce canonical PCM
#[derive(thiserror::Error, Debug)]
pub enum ConversionError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status} for {input}: {stderr}")]
    Failed {
        tool: String,
        input: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),
}

/// The audio could not be opened or described before splitting
#[derive(thiserror::Error, Debug)]
pub enum ChunkOpenError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} contains no audio frames")]
    Empty { path: PathBuf },

    #[error("{path} is {len} bytes, not a whole number of {frame}-byte frames")]
    Misaligned { path: PathBuf, len: u64, frame: u64 },

    #[error("invalid stream attributes: {0}")]
    Attributes(String),

    #[error("failed to write chunk {index}: {source}")]
    Write {
        index: usize,
        #[source]
        source: std::io::Error,
    },
}

/// One recognition call failed at the transport or parse level
#[derive(thiserror::Error, Debug)]
pub enum RecognitionError {
    #[error("recognition request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("recognition endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed recognition response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Large-file fallback exhausted
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("file is too large to download: {0}")]
    TooLarge(String),

    #[error("file host request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("file host rejected the request: {0}")]
    Api(String),

    #[error("download returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bot token is not configured")]
    MissingBotToken,
}

impl FetchError {
    /// True when the caller should report the user-actionable "file too large" condition
    pub fn is_too_large(&self) -> bool {
        matches!(self, FetchError::TooLarge(_))
    }
}

/// Failure of a single attempt at one chunk
#[derive(thiserror::Error, Debug)]
pub enum ChunkError {
    #[error("cannot read chunk audio: {0}")]
    Read(#[from] std::io::Error),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

/// Failure that prevents producing even a partial transcript
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("could not obtain recognition credentials: {0}")]
    Credential(#[from] CredentialError),

    #[error("audio conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("audio could not be split: {0}")]
    ChunkOpen(#[from] ChunkOpenError),

    #[error("work directory error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
