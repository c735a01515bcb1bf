use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Configuration for the audio transcriber
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Token endpoint settings
    pub auth: AuthConfig,

    /// Recognition service settings
    pub speech: SpeechConfig,

    /// Audio conversion and chunking settings
    pub audio: AudioConfig,

    /// Orchestration settings
    pub pipeline: PipelineConfig,

    /// File hosting API used by the large-file fallback
    pub telegram: TelegramConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth endpoint issuing access tokens
    pub oauth_url: String,

    /// Static client key sent as `Authorization: Basic`
    pub client_key: Option<String>,

    /// Scope requested for the recognition service
    pub scope: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Skip TLS verification (the service certificate is issued by a non-public CA)
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Recognition endpoint
    pub recognize_url: String,

    /// Recognition language
    pub language: String,

    /// Recognition model
    pub model: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Skip TLS verification
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Codec tool used for normalization
    pub ffmpeg_path: PathBuf,

    /// Longest chunk sent in one recognition request
    pub max_chunk_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Attempts per chunk, first pass included
    pub max_attempts: u32,

    /// Root under which each call creates its own work directory
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token used for file metadata and downloads
    pub bot_token: Option<String>,

    /// Bot API base URL
    pub api_base: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            oauth_url: "https://ngw.devices.sberbank.ru:9443/api/v2/oauth".to_string(),
            client_key: None,
            scope: "SALUTE_SPEECH_PERS".to_string(),
            timeout_seconds: 10,
            accept_invalid_certs: false,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            recognize_url: "https://smartspeech.sber.ru/rest/v1/speech:recognize".to_string(),
            language: "ru-RU".to_string(),
            model: "general".to_string(),
            timeout_seconds: 120,
            accept_invalid_certs: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            max_chunk_duration_ms: 60_000,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            temp_dir: PathBuf::from("./temp"),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: "https://api.telegram.org".to_string(),
            timeout_seconds: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "audio_transcriber=info,warn".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            speech: SpeechConfig::default(),
            audio: AudioConfig::default(),
            pipeline: PipelineConfig::default(),
            telegram: TelegramConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Bundled Windows builds ship ffmpeg next to the executable
fn default_ffmpeg_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("ffmpeg").join("bin").join("ffmpeg.exe")
    } else {
        PathBuf::from("ffmpeg")
    }
}

impl Config {
    /// Load configuration from the first readable location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_paths = [
            "audio-transcriber.toml",
            "config/audio-transcriber.toml",
            "/etc/audio-transcriber/config.toml",
        ];

        for path in &config_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        tracing::debug!("No configuration file found, using defaults and environment");
        Ok(Self::from_env())
    }

    /// Load configuration from an explicit file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env();
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("SALUTE_SPEECH_API_KEY") {
            self.auth.client_key = Some(key);
        }

        if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
            self.telegram.bot_token = Some(token);
        }

        if let Ok(ffmpeg) = std::env::var("TRANSCRIBER_FFMPEG") {
            self.audio.ffmpeg_path = PathBuf::from(ffmpeg);
        }

        if let Ok(temp_dir) = std::env::var("TRANSCRIBER_TEMP_DIR") {
            self.pipeline.temp_dir = PathBuf::from(temp_dir);
        }

        if let Ok(level) = std::env::var("TRANSCRIBER_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.as_ref().display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_attempts == 0 {
            return Err(anyhow!("pipeline.max_attempts must be greater than 0"));
        }

        if self.audio.max_chunk_duration_ms == 0 {
            return Err(anyhow!("audio.max_chunk_duration_ms must be greater than 0"));
        }

        for (name, value) in [
            ("auth.oauth_url", &self.auth.oauth_url),
            ("speech.recognize_url", &self.speech.recognize_url),
            ("telegram.api_base", &self.telegram.api_base),
        ] {
            Url::parse(value).map_err(|e| anyhow!("{} is not a valid URL ({}): {}", name, value, e))?;
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Audio Transcriber Configuration:\n\
            - Recognition: {} ({}, {})\n\
            - Client key: {}\n\
            - Chunk duration: {}ms\n\
            - Attempts per chunk: {}\n\
            - Codec tool: {}\n\
            - Temp root: {}",
            self.speech.recognize_url,
            self.speech.language,
            self.speech.model,
            if self.auth.client_key.is_some() { "set" } else { "missing" },
            self.audio.max_chunk_duration_ms,
            self.pipeline.max_attempts,
            self.audio.ffmpeg_path.display(),
            self.pipeline.temp_dir.display(),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_client_key(mut self, key: String) -> Self {
        self.config.auth.client_key = Some(key);
        self
    }

    pub fn with_oauth_url(mut self, url: String) -> Self {
        self.config.auth.oauth_url = url;
        self
    }

    pub fn with_recognize_url(mut self, url: String) -> Self {
        self.config.speech.recognize_url = url;
        self
    }

    pub fn with_language(mut self, language: String) -> Self {
        self.config.speech.language = language;
        self
    }

    pub fn with_chunk_duration_ms(mut self, ms: u64) -> Self {
        self.config.audio.max_chunk_duration_ms = ms;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.pipeline.max_attempts = attempts;
        self
    }

    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.config.pipeline.temp_dir = dir;
        self
    }

    pub fn with_bot_token(mut self, token: String) -> Self {
        self.config.telegram.bot_token = Some(token);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
