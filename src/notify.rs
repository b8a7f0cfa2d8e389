//! Delivery of "your Space is ready" notices.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::info;
use url::Url;
use uuid::Uuid;

use crate::formats::MediaSummary;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("notification endpoint answered {0}")]
    Status(StatusCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn space_ready(recipient: &str, summary: &MediaSummary) -> Self {
        let body = format!(
            "Hi there!\n\n\
             Your Twitter Space download is ready:\n\n\
             Title: {}\n\
             Author: {}\n\
             Duration: {}\n\n\
             Thank you for using the Twitter Space Downloader!",
            summary.title, summary.author, summary.duration
        );

        Self {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            subject: "Your Twitter Space Download is Ready!".to_string(),
            body,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes the notice to the log instead of delivering it.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            id = %notification.id,
            recipient = %notification.recipient,
            "Simulated notification: {}\n{}",
            notification.subject,
            notification.body
        );
        Ok(())
    }
}

/// POSTs the notice as JSON to an external mail relay.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(notification)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status()));
        }

        info!(
            id = %notification.id,
            recipient = %notification.recipient,
            "Notification relayed to {}",
            self.endpoint
        );
        Ok(())
    }
}
