use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bedwatch_domain::{Alert, Department, NotificationChannelConfig, Severity};
use bedwatch_ports::NotificationPort;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationChannel {
    /// Emit a tracing event.
    Log,
    /// POST the message to an ntfy topic.
    Ntfy { url: String, topic: String },
}

impl From<NotificationChannelConfig> for NotificationChannel {
    fn from(config: NotificationChannelConfig) -> Self {
        match config {
            NotificationChannelConfig::Log => NotificationChannel::Log,
            NotificationChannelConfig::Ntfy { url, topic } => NotificationChannel::Ntfy { url, topic },
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationService {
    channels: Arc<RwLock<Vec<NotificationChannel>>>,
    client: reqwest::Client,
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl NotificationService {
    pub fn new(channels: Vec<NotificationChannel>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            channels: Arc::new(RwLock::new(channels)),
            client,
        }
    }

    pub fn from_config(channels: Vec<NotificationChannelConfig>) -> Self {
        Self::new(channels.into_iter().map(NotificationChannel::from).collect())
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Add a channel, or replace an equal one.
    pub fn configure_channel(&self, channel: NotificationChannel) {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }

    async fn deliver(
        &self,
        channel: &NotificationChannel,
        alert: &Alert,
        department: &Department,
    ) -> Result<()> {
        match channel {
            NotificationChannel::Log => {
                match alert.severity {
                    Severity::Critical => tracing::error!(
                        department = %department.id,
                        alert_id = %alert.id,
                        "{}",
                        alert.message
                    ),
                    _ => tracing::warn!(
                        department = %department.id,
                        alert_id = %alert.id,
                        "{}",
                        alert.message
                    ),
                }
                Ok(())
            }
            NotificationChannel::Ntfy { url, topic } => {
                let endpoint = format!("{}/{}", url.trim_end_matches('/'), topic);
                self.client
                    .post(&endpoint)
                    .header("Title", title(alert, department))
                    .header("Priority", priority(alert.severity))
                    .header("Tags", alert.severity.as_str())
                    .body(alert.message.clone())
                    .send()
                    .await
                    .with_context(|| format!("failed to reach {endpoint}"))?
                    .error_for_status()
                    .with_context(|| format!("ntfy rejected alert {}", alert.id))?;
                Ok(())
            }
        }
    }
}

fn title(alert: &Alert, department: &Department) -> String {
    format!(
        "{} capacity {}",
        department.name,
        alert.severity.as_str().to_uppercase()
    )
}

fn priority(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "urgent",
        Severity::Warning => "high",
        Severity::Normal => "default",
    }
}

#[async_trait]
impl NotificationPort for NotificationService {
    async fn send_alert(&self, alert: &Alert, department: &Department) -> Result<()> {
        let mut failures = Vec::new();
        for channel in self.channels() {
            if let Err(e) = self.deliver(&channel, alert, department).await {
                failures.push(format!("{e:#}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("{} channel(s) failed: {}", failures.len(), failures.join("; "))
        }
    }
}
