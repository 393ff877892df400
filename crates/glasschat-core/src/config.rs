//! Core configuration loaded from environment variables.
//!
//! All settings have defaults so the core can start with zero
//! configuration for local development; the empty suggestion endpoint
//! simply makes the suggestion client fall back to its canned replies.

use glasschat_media::ImageHost;

use crate::gate::IdentityGate;
use crate::suggest::SuggestionClient;

/// Core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// The only identity permitted to act as administrator.
    /// Env: `GLASSCHAT_ADMIN_EMAIL`
    /// Default: `admin@localhost` (development only).
    pub admin_email: String,

    /// Image host upload endpoint.
    /// Env: `GLASSCHAT_IMAGE_HOST_URL`
    pub image_host_url: String,

    /// Image host API key (sent as a query parameter).
    /// Env: `GLASSCHAT_IMAGE_HOST_KEY`
    /// Default: empty (uploads will be rejected by the host).
    pub image_host_key: String,

    /// Suggestion API endpoint.
    /// Env: `GLASSCHAT_SUGGEST_URL`
    /// Default: empty (quick replies come from the fallback list).
    pub suggest_url: String,

    /// Suggestion API key.
    /// Env: `GLASSCHAT_SUGGEST_KEY`
    pub suggest_key: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            admin_email: "admin@localhost".to_string(),
            image_host_url: "https://api.imgbb.com/1/upload".to_string(),
            image_host_key: String::new(),
            suggest_url: String::new(),
            suggest_key: String::new(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(email) = std::env::var("GLASSCHAT_ADMIN_EMAIL") {
            if !email.is_empty() {
                config.admin_email = email;
            }
        }
        if let Ok(url) = std::env::var("GLASSCHAT_IMAGE_HOST_URL") {
            config.image_host_url = url;
        }
        if let Ok(key) = std::env::var("GLASSCHAT_IMAGE_HOST_KEY") {
            config.image_host_key = key;
        }
        if let Ok(url) = std::env::var("GLASSCHAT_SUGGEST_URL") {
            config.suggest_url = url;
        }
        if let Ok(key) = std::env::var("GLASSCHAT_SUGGEST_KEY") {
            config.suggest_key = key;
        }

        config
    }

    pub fn identity_gate(&self) -> IdentityGate {
        IdentityGate::new(self.admin_email.clone())
    }

    pub fn image_host(&self) -> ImageHost {
        ImageHost::new(self.image_host_url.clone(), self.image_host_key.clone())
    }

    pub fn suggestion_client(&self) -> SuggestionClient {
        SuggestionClient::new(self.suggest_url.clone(), self.suggest_key.clone())
    }
}
