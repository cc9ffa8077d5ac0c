#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Alert rendering and delivery.
//!
//! [`format`] turns classified detections into the human-readable alert
//! text. Delivery goes through the [`AlertDispatcher`] trait; [`whapi`]
//! provides the `WhatsApp` group implementation.

pub mod format;
pub mod whapi;

/// Errors that can occur while delivering an alert.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the message.
    #[error("Provider rejected message (HTTP {status}): {message}")]
    Rejected {
        /// Response status code.
        status: u16,
        /// Provider error text.
        message: String,
    },
}

/// Acknowledgement for a delivered alert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// Provider message id, when the provider returns one.
    pub message_id: Option<String>,
}

/// Delivers a pre-formatted alert body to a destination.
#[async_trait::async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Sends `body` to `destination` (e.g. a group id).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if delivery fails for any reason.
    async fn dispatch(&self, destination: &str, body: &str) -> Result<DispatchReceipt, DispatchError>;
}
