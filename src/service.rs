//! Request orchestration: normalize, validate, extract, reduce, and for Space
//! audio, download through the cache.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::{
    cache::{CachedFile, DownloadCache, cached_filename},
    extractor::{DownloadOptions, ExtractionError, MediaExtractor},
    formats::{
        AudioLabelScheme, MediaRecord, MediaSummary, ReducedFormat, Reduction, ReductionMode,
    },
    humanize::{DurationStyle, format_duration, format_filesize},
    links,
    notify::{Notification, NotificationSink, NotifyError},
};

const DOWNLOADED_QUALITY: &str = "High Quality (192kbps)";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid Twitter Space URL. Please provide a valid Twitter Spaces link.")]
    InvalidUrl,
    #[error("No Space found in the provided URL")]
    NoMedia,
    #[error("No downloadable Twitter Spaces formats found")]
    NoFormats,
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("download cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("download completed but file not found: {0}")]
    FileMissing(String),
    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),
}

/// How an info-only request reduces and renders a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoProfile {
    pub reduction: Reduction,
    pub duration: DurationStyle,
}

impl InfoProfile {
    /// Audio-only Space listing: three mp3 entries at most.
    pub const SPACE_AUDIO: Self = Self {
        reduction: Reduction {
            mode: ReductionMode::AudioOnly,
            audio_labels: AudioLabelScheme::SampleRateFallback,
            cap: 3,
        },
        duration: DurationStyle::Clock,
    };

    /// Anything with an audio track, in its native container.
    pub const PREFERRED_AUDIO: Self = Self {
        reduction: Reduction {
            mode: ReductionMode::AudioPreferred,
            audio_labels: AudioLabelScheme::CodecFallback,
            cap: 5,
        },
        duration: DurationStyle::Minutes,
    };

    pub fn with_mode(mut self, mode: ReductionMode) -> Self {
        self.reduction.mode = mode;
        self
    }

    pub fn summarize(&self, record: &MediaRecord) -> MediaSummary {
        MediaSummary {
            title: record.title().to_string(),
            author: record.author().to_string(),
            duration: format_duration(record.duration, self.duration),
            thumbnail: record.thumbnail.clone().unwrap_or_default(),
            formats: self.reduction.reduce_record(record),
        }
    }
}

/// A Space whose audio sits in the download cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceDownload {
    pub title: String,
    pub author: String,
    pub duration: String,
    pub thumbnail: String,
    pub file: CachedFile,
    pub download_url: String,
}

impl SpaceDownload {
    pub fn into_summary(self) -> MediaSummary {
        let format = ReducedFormat {
            format_id: "mp3".to_string(),
            url: self.download_url,
            ext: "mp3".to_string(),
            quality: DOWNLOADED_QUALITY.to_string(),
            filesize: format_filesize(Some(self.file.size as f64)),
            filename: self.file.filename,
        };

        MediaSummary {
            title: self.title,
            author: self.author,
            duration: self.duration,
            thumbnail: self.thumbnail,
            formats: vec![format],
        }
    }
}

pub struct SpaceService {
    extractor: Arc<dyn MediaExtractor>,
    cache: DownloadCache,
    notifier: Arc<dyn NotificationSink>,
}

impl SpaceService {
    pub fn new(
        extractor: Arc<dyn MediaExtractor>,
        cache: DownloadCache,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            extractor,
            cache,
            notifier,
        }
    }

    pub fn cache(&self) -> &DownloadCache {
        &self.cache
    }

    async fn fetch_record(&self, raw_url: &str) -> Result<(String, MediaRecord), ServiceError> {
        let url = links::normalize(raw_url);
        if !links::is_valid(&url) {
            return Err(ServiceError::InvalidUrl);
        }

        debug!("Extracting metadata for {url}");
        let record = self
            .extractor
            .extract_metadata(&url)
            .await?
            .primary()
            .ok_or(ServiceError::NoMedia)?;

        Ok((url, record))
    }

    /// Metadata plus reduced formats; `formats` may be empty.
    #[instrument(skip(self, profile))]
    pub async fn extract_info(
        &self,
        raw_url: &str,
        profile: InfoProfile,
    ) -> Result<MediaSummary, ServiceError> {
        let (_, record) = self.fetch_record(raw_url).await?;
        let summary = profile.summarize(&record);
        info!(
            "Extracted {:?} with {} format(s)",
            summary.title,
            summary.formats.len()
        );
        Ok(summary)
    }

    /// Fetches Space audio into the cache, reusing a cached copy when one
    /// exists. Metadata is always re-extracted to derive the file name.
    #[instrument(skip(self))]
    pub async fn download_audio(&self, raw_url: &str) -> Result<SpaceDownload, ServiceError> {
        let (url, record) = self.fetch_record(raw_url).await?;
        let filename = cached_filename(record.title());

        let _claim = self.cache.claim(&filename).await;
        let file = match self.cache.lookup(&filename).await? {
            Some(file) => {
                info!("File already cached: {filename}");
                file
            }
            None => {
                info!("Downloading Space audio: {}", record.title());
                let options = DownloadOptions::space_audio(self.cache.output_template(&filename));
                self.extractor.download(&url, &options).await?;

                self.cache
                    .settle(&filename)
                    .await?
                    .ok_or_else(|| ServiceError::FileMissing(filename.clone()))?
            }
        };
        info!("Space audio ready: {} ({} bytes)", file.filename, file.size);

        Ok(SpaceDownload {
            title: record.title().to_string(),
            author: record.author().to_string(),
            duration: format_duration(record.duration, DurationStyle::Clock),
            thumbnail: record.thumbnail.clone().unwrap_or_default(),
            download_url: format!("/download/{}", urlencoding::encode(&file.filename)),
            file,
        })
    }

    /// Resolves the Space and notifies `email`. No download is queued.
    #[instrument(skip(self))]
    pub async fn request_notification(
        &self,
        raw_url: &str,
        email: &str,
    ) -> Result<MediaSummary, ServiceError> {
        let summary = self.extract_info(raw_url, InfoProfile::SPACE_AUDIO).await?;
        info!("Processing Space download for {:?} -> {email}", summary.title);

        self.notifier
            .send(&Notification::space_ready(email, &summary))
            .await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::testing::{FakeExtractor, RecordingNotifier, service_with};

    fn space_record() -> serde_json::Value {
        json!({
            "title": "Builders chat",
            "uploader": "host",
            "duration": 3725,
            "thumbnail": "https://img.example/t.jpg",
            "formats": [
                {"format_id": "hls-64", "url": "https://cdn.example/64", "ext": "m4a",
                 "vcodec": "none", "acodec": "mp4a.40.5", "abr": 64, "filesize": 100},
                {"format_id": "hls-64b", "url": "https://cdn.example/64b", "ext": "m4a",
                 "vcodec": "none", "acodec": "mp4a.40.5", "abr": 64, "filesize": 900},
                {"format_id": "hls-128", "url": "https://cdn.example/128", "ext": "m4a",
                 "vcodec": "none", "acodec": "mp4a.40.2", "abr": 128}
            ]
        })
    }

    #[tokio::test]
    async fn invalid_url_never_reaches_extractor() {
        let extractor = FakeExtractor::new(space_record());
        let (_dir, service) = service_with(extractor.clone());

        let error = service
            .extract_info("https://example.com/i/spaces/abc", InfoProfile::SPACE_AUDIO)
            .await
            .expect_err("foreign host");

        assert!(matches!(error, ServiceError::InvalidUrl));
        assert_eq!(extractor.metadata_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn extract_info_reduces_and_normalizes() {
        let extractor = FakeExtractor::new(space_record());
        let (_dir, service) = service_with(extractor.clone());

        let summary = service
            .extract_info(" x.com/i/spaces/1abc ", InfoProfile::SPACE_AUDIO)
            .await
            .expect("info");

        assert_eq!(
            extractor.last_url().as_deref(),
            Some("https://twitter.com/i/spaces/1abc")
        );
        assert_eq!(summary.title, "Builders chat");
        assert_eq!(summary.author, "host");
        assert_eq!(summary.duration, "01:02:05");
        let ids: Vec<_> = summary.formats.iter().map(|item| item.format_id.as_str()).collect();
        assert_eq!(ids, ["hls-64b", "hls-128"]);
        assert!(summary.formats.iter().all(|item| item.ext == "mp3"));
    }

    #[tokio::test]
    async fn preferred_audio_profile_uses_minutes() {
        let (_dir, service) = service_with(FakeExtractor::new(space_record()));

        let summary = service
            .extract_info("https://twitter.com/i/spaces/1abc", InfoProfile::PREFERRED_AUDIO)
            .await
            .expect("info");

        assert_eq!(summary.duration, "62:05");
        assert_eq!(summary.formats[0].ext, "m4a");
        assert_eq!(summary.formats[0].quality, "Audio (64kbps)");
    }

    #[tokio::test]
    async fn empty_playlist_is_no_media() {
        let (_dir, service) = service_with(FakeExtractor::new(json!({"entries": []})));

        let error = service
            .extract_info("https://twitter.com/i/spaces/1abc", InfoProfile::SPACE_AUDIO)
            .await
            .expect_err("empty playlist");
        assert!(matches!(error, ServiceError::NoMedia));
    }

    #[tokio::test]
    async fn extractor_failure_propagates() {
        let (_dir, service) = service_with(FakeExtractor::failing());

        let error = service
            .extract_info("https://twitter.com/i/spaces/1abc", InfoProfile::SPACE_AUDIO)
            .await
            .expect_err("extractor down");
        assert!(matches!(error, ServiceError::Extraction(_)));
    }

    #[tokio::test]
    async fn cache_hit_skips_download() {
        let extractor = FakeExtractor::new(space_record());
        let (_dir, service) = service_with(extractor.clone());
        let filename = cached_filename("Builders chat");
        tokio::fs::write(service.cache().path_for(&filename), vec![0u8; 1536])
            .await
            .expect("seed cache");

        let download = service
            .download_audio("https://twitter.com/i/spaces/1abc")
            .await
            .expect("download");

        assert_eq!(extractor.download_calls.load(Ordering::SeqCst), 0);
        assert_eq!(extractor.metadata_calls.load(Ordering::SeqCst), 1);
        assert_eq!(download.file.size, 1536);
        assert_eq!(download.file.filename, filename);

        let summary = download.into_summary();
        assert_eq!(summary.formats.len(), 1);
        assert_eq!(summary.formats[0].filesize, "1.5 KB");
        assert_eq!(summary.formats[0].quality, "High Quality (192kbps)");
        assert_eq!(summary.formats[0].url, format!("/download/{filename}"));
    }

    #[tokio::test]
    async fn cache_miss_downloads_and_settles_extension() {
        let extractor = FakeExtractor::new(space_record()).writing("m4a", b"audio");
        let (_dir, service) = service_with(extractor.clone());

        let download = service
            .download_audio("https://twitter.com/i/spaces/1abc")
            .await
            .expect("download");

        assert_eq!(extractor.download_calls.load(Ordering::SeqCst), 1);
        assert!(download.file.filename.ends_with(".mp3"));
        assert!(download.file.path.exists());
        assert_eq!(download.file.size, 5);
    }

    #[tokio::test]
    async fn missing_download_output_is_reported() {
        let (_dir, service) = service_with(FakeExtractor::new(space_record()));

        let error = service
            .download_audio("https://twitter.com/i/spaces/1abc")
            .await
            .expect_err("nothing written");
        assert!(matches!(error, ServiceError::FileMissing(_)));
    }

    #[tokio::test]
    async fn concurrent_requests_download_once() {
        let extractor = FakeExtractor::new(space_record()).writing("mp3", b"audio");
        let (_dir, service) = service_with(extractor.clone());

        let (first, second) = tokio::join!(
            service.download_audio("https://twitter.com/i/spaces/1abc"),
            service.download_audio("https://x.com/i/spaces/1abc"),
        );

        assert_eq!(first.expect("first").file, second.expect("second").file);
        assert_eq!(extractor.download_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notification_carries_space_details() {
        let notifier = RecordingNotifier::default();
        let (_dir, service) = crate::testing::service_with_notifier(
            FakeExtractor::new(space_record()),
            Arc::new(notifier.clone()),
        );

        let summary = service
            .request_notification("https://twitter.com/i/spaces/1abc", "fan@example.org")
            .await
            .expect("notify");

        assert_eq!(summary.title, "Builders chat");
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "fan@example.org");
        assert!(sent[0].body.contains("Builders chat"));
    }
}
