// src/services/notify.rs

//! Run start and completion notices.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::models::NotifyConfig;

/// Destination of run notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

/// Writes notices to the log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        log::info!("{}", message);
        Ok(())
    }
}

/// Posts `{"text": message}` to an incoming webhook.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        log::info!("{}", message);
        self.http
            .post(&self.url)
            .json(&json!({ "text": message }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Pick the notifier configured by `[notify]`.
pub fn notifier_from_config(config: &NotifyConfig) -> Result<Box<dyn Notifier>> {
    match config.webhook_url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => Ok(Box::new(WebhookNotifier::new(url)?)),
        None => Ok(Box::new(LogNotifier)),
    }
}
