//! Record lookup for record-driven merges
//!
//! A record is a row in an external table API whose attachment fields point
//! at one video and one audio file. Records are fetched as
//! `GET <base_url>/<record_id>` and attachments read from
//! `fields.<field>[0].url`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::RecordLookupConfig;
use crate::error::{ComposeError, Result};
use crate::job::{AssetDescriptor, AssetRole, CompositionMode, CompositionRequest};

/// Attachment reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub url: String,
}

/// Media attachments of one record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub video: Option<AssetRef>,
    pub audio: Option<AssetRef>,
}

impl MediaRecord {
    /// Audio-video merge request for this record.
    ///
    /// Fails before any download when either attachment is missing.
    pub fn into_request(self, id: &str, callback_url: &str) -> Result<CompositionRequest> {
        let (video, audio) = match (self.video, self.audio) {
            (Some(video), Some(audio)) => (video, audio),
            (None, _) => {
                return Err(ComposeError::Validation(format!(
                    "record {id} has no video attachment"
                )))
            }
            (_, None) => {
                return Err(ComposeError::Validation(format!(
                    "record {id} has no audio attachment"
                )))
            }
        };

        Ok(CompositionRequest {
            id: id.to_string(),
            mode: CompositionMode::AudioVideo,
            assets: vec![
                AssetDescriptor::new(video.url).with_role(AssetRole::Video),
                AssetDescriptor::new(audio.url).with_role(AssetRole::Audio),
            ],
            fps: None,
            width: None,
            height: None,
            duration: None,
            callback_url: callback_url.to_string(),
        })
    }
}

/// Resolves record ids to media attachments
#[async_trait]
pub trait RecordLookup: Send + Sync {
    async fn lookup(&self, record_id: &str) -> Result<MediaRecord>;
}

/// Bearer-authenticated table API client
pub struct HttpRecordLookup {
    client: Client,
    config: RecordLookupConfig,
}

impl HttpRecordLookup {
    pub fn new(config: RecordLookupConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| ComposeError::Validation(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn record_url(&self, record_id: &str) -> String {
        format!("{}/{record_id}", self.config.base_url.trim_end_matches('/'))
    }
}

/// First attachment URL of `fields.<field>`
fn attachment(body: &Value, field: &str) -> Option<AssetRef> {
    body.get("fields")?
        .get(field)?
        .get(0)?
        .get("url")?
        .as_str()
        .map(|url| AssetRef {
            url: url.to_string(),
        })
}

fn parse_record(body: &Value, config: &RecordLookupConfig) -> MediaRecord {
    MediaRecord {
        video: attachment(body, &config.video_field),
        audio: attachment(body, &config.audio_field),
    }
}

#[async_trait]
impl RecordLookup for HttpRecordLookup {
    #[instrument(skip(self))]
    async fn lookup(&self, record_id: &str) -> Result<MediaRecord> {
        let url = self.record_url(record_id);
        debug!("Looking up {url}");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| ComposeError::fetch(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ComposeError::fetch(&url, format!("HTTP {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ComposeError::fetch(&url, format!("invalid record body: {e}")))?;
        Ok(parse_record(&body, &self.config))
    }
}
