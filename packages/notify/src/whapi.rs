//! Whapi Cloud `WhatsApp` text-message dispatcher.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AlertDispatcher, DispatchError, DispatchReceipt};

/// Default Whapi Cloud gateway.
pub const DEFAULT_BASE_URL: &str = "https://gate.whapi.cloud";

/// Default per-request time budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends alerts as `WhatsApp` text messages through Whapi Cloud.
pub struct WhapiDispatcher {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl WhapiDispatcher {
    /// Creates a dispatcher for the given gateway and bearer token. Each
    /// send is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/messages/text", self.base_url)
    }
}

/// Whapi text message request body.
#[derive(Serialize)]
struct TextMessage<'a> {
    to: &'a str,
    body: &'a str,
}

/// Successful send response. Only the id is used.
#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    message: Option<SentMessage>,
}

#[derive(Deserialize)]
struct SentMessage {
    id: Option<String>,
}

/// Whapi error response.
#[derive(Deserialize)]
struct WhapiError {
    #[serde(default)]
    error: Option<WhapiErrorDetail>,
    #[serde(default)]
    errors: Vec<WhapiErrorDetail>,
}

#[derive(Deserialize)]
struct WhapiErrorDetail {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl WhapiErrorDetail {
    fn describe(&self) -> String {
        [&self.title, &self.message, &self.details]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join(" - ")
    }
}

/// Extracts a readable error from a failed response body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<WhapiError>(body)
        .ok()
        .and_then(|e| e.error.or_else(|| e.errors.into_iter().next()))
        .map(|d| d.describe())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(300).collect())
}

/// Extracts the message id from a successful response body, if any.
fn message_id(body: &str) -> Option<String> {
    let response: SendResponse = serde_json::from_str(body).ok()?;
    response.message.and_then(|m| m.id).or(response.id)
}

#[async_trait::async_trait]
impl AlertDispatcher for WhapiDispatcher {
    async fn dispatch(&self, destination: &str, body: &str) -> Result<DispatchReceipt, DispatchError> {
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.token)
            .json(&TextMessage {
                to: destination,
                body,
            })
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let receipt = DispatchReceipt {
            message_id: message_id(&text),
        };
        log::info!(
            "Alert delivered to {destination} (message id: {})",
            receipt.message_id.as_deref().unwrap_or("n/a")
        );
        Ok(receipt)
    }
}
