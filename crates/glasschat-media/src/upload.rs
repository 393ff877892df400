//! Image host client.
//!
//! The host accepts a base64-encoded payload as an HTTP POST form field
//! with the API key in a query parameter, and answers with the hosted URL
//! under `data.url`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::error::MediaError;

/// Anything that can turn an image payload into a hosted URL.
///
/// The send pipeline is generic over this so it can run against a stub in
/// tests; [`ImageHost`] is the production implementation.
#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    async fn upload(&self, image_bytes: &[u8]) -> Result<String, MediaError>;
}

/// Client for the external image host.
#[derive(Debug, Clone)]
pub struct ImageHost {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ImageHost {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Upload an image payload, returning the hosted URL.
    pub async fn upload(&self, image_bytes: &[u8]) -> Result<String, MediaError> {
        let payload = STANDARD.encode(image_bytes);

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .form(&[("image", payload.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::UploadRejected(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        let url = hosted_url(&body).ok_or(MediaError::MalformedResponse)?;
        debug!(url = %url, bytes = image_bytes.len(), "image uploaded");
        Ok(url)
    }
}

#[async_trait]
impl AttachmentUploader for ImageHost {
    async fn upload(&self, image_bytes: &[u8]) -> Result<String, MediaError> {
        ImageHost::upload(self, image_bytes).await
    }
}

fn hosted_url(body: &serde_json::Value) -> Option<String> {
    body.get("data")?
        .get("url")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_hosted_url() {
        let body = json!({"data": {"url": "https://img.example/abc.jpg", "id": "abc"}});
        assert_eq!(
            hosted_url(&body).as_deref(),
            Some("https://img.example/abc.jpg")
        );
    }

    #[test]
    fn rejects_missing_or_mistyped_url() {
        assert!(hosted_url(&json!({})).is_none());
        assert!(hosted_url(&json!({"data": {}})).is_none());
        assert!(hosted_url(&json!({"data": {"url": 42}})).is_none());
    }
}
