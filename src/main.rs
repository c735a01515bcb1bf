use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use audio_transcriber::{Config, CredentialManager, FfmpegNormalizer, LargeFileRetriever, Transcriber};

#[derive(Parser)]
#[command(name = "audio-transcriber")]
#[command(version, about = "Chunked speech-to-text for long audio files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the standard search locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Transcribe a local audio file
    Transcribe {
        /// Audio file in any format ffmpeg can read
        file: PathBuf,
        /// Write the transcript here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Download a file that is too large for the regular bot download
    Fetch {
        /// Hosting file id
        file_id: String,
        /// Destination directory
        #[arg(short, long, default_value = "./downloads")]
        dir: PathBuf,
        /// Transcribe the file after downloading it
        #[arg(long)]
        transcribe: bool,
    },
    /// Acquire an access token and show its expiry
    Token {
        /// Discard any cached token first
        #[arg(long)]
        refresh: bool,
    },
}

fn init_logging(config: &Config, verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("audio_transcriber=debug,info"))
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    init_logging(&config, cli.verbose);
    config.validate().context("Invalid configuration")?;

    info!("🚀 Audio Transcriber starting...");
    if cli.verbose {
        info!("{}", config.summary());
    }

    match cli.command {
        Commands::Transcribe { file, output } => {
            let credentials = Arc::new(CredentialManager::from_config(&config.auth)?);
            let complete = transcribe_file(&config, credentials, &file, output.as_deref()).await?;
            if !complete {
                std::process::exit(1);
            }
        }
        Commands::Fetch {
            file_id,
            dir,
            transcribe,
        } => {
            let retriever = LargeFileRetriever::new(&config.telegram)?;

            let path = match retriever.fetch_oversized(&file_id, &dir).await {
                Ok(path) => path,
                Err(e) if e.is_too_large() => {
                    error!("📦 File {} is too large to download: {}", file_id, e);
                    std::process::exit(2);
                }
                Err(e) => return Err(anyhow::Error::new(e).context(format!("Failed to fetch {}", file_id))),
            };

            println!("{}", path.display());

            if transcribe {
                let credentials = Arc::new(CredentialManager::from_config(&config.auth)?);
                let complete = transcribe_file(&config, credentials, &path, None).await?;
                if !complete {
                    std::process::exit(1);
                }
            }
        }
        Commands::Token { refresh } => {
            let credentials = CredentialManager::from_config(&config.auth)?;
            if refresh {
                credentials.invalidate().await;
            }

            let credential = credentials
                .get_token()
                .await
                .context("Failed to obtain access token")?;

            info!("🔑 Token acquired");
            println!("Token expires at {}", credential.expires_at.to_rfc3339());
        }
    }

    Ok(())
}

/// Run the pipeline and report; returns whether every chunk was recognized
async fn transcribe_file(
    config: &Config,
    credentials: Arc<CredentialManager>,
    file: &Path,
    output: Option<&Path>,
) -> Result<bool> {
    if !file.exists() {
        return Err(anyhow::anyhow!("Input file not found: {}", file.display()));
    }

    let normalizer = FfmpegNormalizer::new(config.audio.ffmpeg_path.clone());
    if !normalizer.check_available().await {
        return Err(anyhow::anyhow!(
            "ffmpeg not found at {} (set audio.ffmpeg_path or TRANSCRIBER_FFMPEG)",
            normalizer.binary().display()
        ));
    }

    let transcriber = Transcriber::from_config(config, credentials)?;
    let result = transcriber
        .transcribe(file)
        .await
        .with_context(|| format!("Failed to transcribe {}", file.display()))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &result.transcript)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("💾 Transcript saved to: {}", path.display());
        }
        None => println!("{}", result.transcript),
    }

    for failure in &result.failures {
        warn!("⚠️  {}", failure);
    }

    Ok(result.is_complete())
}
