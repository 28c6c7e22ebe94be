use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("failed to build http client: {0}")]
    Client(String),

    #[error("webhook request failed: {0}")]
    Transport(String),

    #[error("webhook returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Flattened enrollment record posted to the spreadsheet integration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentRecordPayload {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub extra_info: String,
    pub course_slug: String,
    pub course_title: String,
    pub timestamp: String,
}

#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn post_enrollment(&self, record: &EnrollmentRecordPayload) -> Result<(), WebhookError>;
}

pub struct HttpWebhookClient {
    client: Client,
    url: String,
}

impl HttpWebhookClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebhookError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[derive(Deserialize)]
struct WebhookErrorBody {
    error: serde_json::Value,
}

#[async_trait]
impl WebhookClient for HttpWebhookClient {
    async fn post_enrollment(&self, record: &EnrollmentRecordPayload) -> Result<(), WebhookError> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| WebhookError::Transport(e.to_string()))?;

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(status = %status, error = %e, "failed to read enrollment webhook response body");
                String::new()
            }
        };
        info!(status = %status, email = %record.email, course = %record.course_slug, "enrollment webhook responded");

        if status != StatusCode::OK {
            let message = rejection_message(status, &body);
            warn!(status = %status, message = %message, "enrollment webhook rejected record");
            return Err(WebhookError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

/// The `error` field of a JSON body when present, otherwise the raw body.
/// An empty body falls back to the status reason.
fn rejection_message(status: StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        return status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string());
    }
    match serde_json::from_str::<WebhookErrorBody>(body) {
        Ok(parsed) => match parsed.error {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        },
        Err(_) => body.to_string(),
    }
}

/// Keeps every posted record in memory. Optionally fails each call with a fixed message.
#[derive(Default)]
pub struct RecordingWebhookClient {
    records: Mutex<Vec<EnrollmentRecordPayload>>,
    failure: Option<String>,
}

impl RecordingWebhookClient {
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    pub fn records(&self) -> Vec<EnrollmentRecordPayload> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WebhookClient for RecordingWebhookClient {
    async fn post_enrollment(&self, record: &EnrollmentRecordPayload) -> Result<(), WebhookError> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        match &self.failure {
            Some(message) => Err(WebhookError::Transport(message.clone())),
            None => Ok(()),
        }
    }
}
