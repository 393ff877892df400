//! Quick-reply suggestion client.
//!
//! One-shot request/response against the external generative API: the
//! last few messages go in as a transcript, exactly three short replies
//! come out. Every failure mode — network, non-success status, malformed
//! payload, wrong count — is soft and falls back to the canned list, so
//! the compose UI always has three chips to show.

use tracing::debug;

use glasschat_shared::constants::{SUGGESTION_CONTEXT_MESSAGES, SUGGESTION_FALLBACKS};
use glasschat_shared::Message;

/// Client for the external suggestion API.
#[derive(Debug, Clone)]
pub struct SuggestionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl SuggestionClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    /// Suggest three quick replies for the conversation so far. Never
    /// fails: any problem yields the fallback list.
    pub async fn quick_replies(&self, messages: &[Message]) -> Vec<String> {
        if self.endpoint.is_empty() {
            return fallback();
        }

        let transcript = transcript(messages);
        match self.fetch(&transcript).await {
            Some(replies) => replies,
            None => {
                debug!("suggestion request failed, using fallback replies");
                fallback()
            }
        }
    }

    async fn fetch(&self, transcript: &str) -> Option<Vec<String>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "transcript": transcript }))
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }
        let body: serde_json::Value = response.json().await.ok()?;
        parse_suggestions(&body)
    }
}

/// The last few messages, one `role: text` line each, oldest first.
/// Image messages contribute a placeholder rather than their URL.
fn transcript(messages: &[Message]) -> String {
    let skip = messages.len().saturating_sub(SUGGESTION_CONTEXT_MESSAGES);
    messages[skip..]
        .iter()
        .map(|m| {
            let text = if m.is_image { "[image]" } else { m.text.as_str() };
            format!("{}: {}", m.sender, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Accept only a JSON array of exactly three strings.
fn parse_suggestions(body: &serde_json::Value) -> Option<Vec<String>> {
    let items = body.as_array()?;
    if items.len() != SUGGESTION_FALLBACKS.len() {
        return None;
    }
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn fallback() -> Vec<String> {
    SUGGESTION_FALLBACKS.iter().map(|s| s.to_string()).collect()
}
