//! The media-extraction capability and its yt-dlp process backend.

use std::{io::ErrorKind, process::Output};

use async_trait::async_trait;
use tokio::{
    process::Command,
    time::{Duration, timeout},
};
use tracing::debug;

use crate::formats::MediaRecord;

/// Format preference for Space audio: native audio containers first.
pub const SPACE_AUDIO_FORMAT: &str = "best[ext=m4a]/best[ext=mp3]/best";

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("yt-dlp is not installed; install it and restart the service")]
    NotInstalled,
    #[error("could not run yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("yt-dlp did not finish within {0} seconds")]
    Timeout(u64),
    #[error("yt-dlp failed: {0}")]
    Failed(String),
    #[error("could not parse yt-dlp metadata: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Post-processing step that transcodes the fetched stream to audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTranscode {
    pub codec: String,
    pub quality: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    pub format: String,
    /// yt-dlp output template, e.g. `/tmp/spaces/name.%(ext)s`.
    pub output_template: String,
    pub extract_audio: Option<AudioTranscode>,
}

impl DownloadOptions {
    pub fn space_audio(output_template: impl Into<String>) -> Self {
        Self {
            format: SPACE_AUDIO_FORMAT.to_string(),
            output_template: output_template.into(),
            extract_audio: Some(AudioTranscode {
                codec: "mp3".to_string(),
                quality: "192K".to_string(),
            }),
        }
    }
}

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Resolves metadata and available formats without fetching media.
    async fn extract_metadata(&self, url: &str) -> Result<MediaRecord, ExtractionError>;

    /// Fetches the media to the location named by `options`.
    async fn download(&self, url: &str, options: &DownloadOptions) -> Result<(), ExtractionError>;
}

pub struct YtDlp {
    binary: String,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn metadata_args(url: &str) -> Vec<String> {
        vec!["-J".to_string(), "--no-warnings".to_string(), url.to_string()]
    }

    fn download_args(url: &str, options: &DownloadOptions) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            options.format.clone(),
            "-o".to_string(),
            options.output_template.clone(),
        ];

        if let Some(transcode) = &options.extract_audio {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(transcode.codec.clone());
            args.push("--audio-quality".to_string());
            args.push(transcode.quality.clone());
        }

        args.push(url.to_string());
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<Output, ExtractionError> {
        debug!("Running {} {:?}", self.binary, args);
        let command_future = Command::new(&self.binary).args(args).kill_on_drop(true).output();
        let output = timeout(self.timeout, command_future)
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout.as_secs()))?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ExtractionError::NotInstalled
                } else {
                    ExtractionError::Spawn(error)
                }
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Failed(run_error_message(&output.stderr)));
        }

        Ok(output)
    }
}

#[async_trait]
impl MediaExtractor for YtDlp {
    async fn extract_metadata(&self, url: &str) -> Result<MediaRecord, ExtractionError> {
        let output = self.run(Self::metadata_args(url)).await?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn download(&self, url: &str, options: &DownloadOptions) -> Result<(), ExtractionError> {
        self.run(Self::download_args(url, options)).await?;
        Ok(())
    }
}

fn run_error_message(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the operation")
        .to_string()
}
