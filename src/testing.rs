//! In-memory stand-ins for the extractor and notification sink.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::{Duration, sleep};

use crate::{
    cache::DownloadCache,
    extractor::{DownloadOptions, ExtractionError, MediaExtractor},
    formats::MediaRecord,
    notify::{LogNotifier, Notification, NotificationSink, NotifyError},
    service::SpaceService,
};

#[derive(Clone, Default)]
pub struct FakeExtractor {
    record: Option<serde_json::Value>,
    output: Option<(String, Vec<u8>)>,
    urls: Arc<Mutex<Vec<String>>>,
    pub metadata_calls: Arc<AtomicUsize>,
    pub download_calls: Arc<AtomicUsize>,
}

impl FakeExtractor {
    pub fn new(record: serde_json::Value) -> Self {
        Self {
            record: Some(record),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    /// Makes `download` write `bytes` with extension `ext`.
    pub fn writing(mut self, ext: &str, bytes: &[u8]) -> Self {
        self.output = Some((ext.to_string(), bytes.to_vec()));
        self
    }

    pub fn last_url(&self) -> Option<String> {
        self.urls.lock().expect("urls lock").last().cloned()
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    async fn extract_metadata(&self, url: &str) -> Result<MediaRecord, ExtractionError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().expect("urls lock").push(url.to_string());

        let record = self
            .record
            .clone()
            .ok_or_else(|| ExtractionError::Failed("ERROR: extractor unavailable".to_string()))?;
        Ok(serde_json::from_value(record)?)
    }

    async fn download(&self, _url: &str, options: &DownloadOptions) -> Result<(), ExtractionError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(10)).await;

        if let Some((ext, bytes)) = &self.output {
            let path = options.output_template.replace("%(ext)s", ext);
            tokio::fs::write(path, bytes)
                .await
                .map_err(ExtractionError::Spawn)?;
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().expect("sent lock").push(notification.clone());
        Ok(())
    }
}

pub fn service_with(extractor: FakeExtractor) -> (TempDir, SpaceService) {
    service_with_notifier(extractor, Arc::new(LogNotifier))
}

pub fn service_with_notifier(
    extractor: FakeExtractor,
    notifier: Arc<dyn NotificationSink>,
) -> (TempDir, SpaceService) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let cache = DownloadCache::new(dir.path());
    let service = SpaceService::new(Arc::new(extractor), cache, notifier);
    (dir, service)
}
