//! Webhook delivery of finished artifacts

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{ComposeError, Result};

/// Body posted to the caller's endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub id: String,
    pub url: String,
}

/// Reports a finished job to its caller
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, endpoint: &str, payload: &CallbackPayload) -> Result<()>;
}

/// JSON-over-HTTP webhook notifier
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| ComposeError::Validation(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip(self, payload), fields(id = %payload.id))]
    async fn notify(&self, endpoint: &str, payload: &CallbackPayload) -> Result<()> {
        let response = self
            .client
            .post(endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| ComposeError::notify(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ComposeError::notify(endpoint, format!("HTTP {status}")));
        }

        info!("Webhook accepted ({status})");
        Ok(())
    }
}
