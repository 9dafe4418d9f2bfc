//! Best-effort alert delivery for newly flagged domains.
//!
//! Messages are rendered by [`template`] and handed to a
//! [`NotificationChannel`]. The [`manager::NotificationManager`] wraps an
//! optional channel: when no channel is configured every notify call is a
//! successful no-op, so callers never special-case "notifications disabled".

pub mod channels;
pub mod error;
pub mod manager;
pub mod template;
pub mod utils;


pub use error::{NotifyError, Result};
pub use manager::NotificationManager;

use async_trait::async_trait;

/// A delivery channel for pre-formatted (HTML) text messages.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Delivers one message to the configured recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery fails after retries (if applicable).
    async fn send_message(&self, text: &str) -> Result<()>;

    /// Checks the channel credentials against the remote service and
    /// returns a human-readable identity (e.g. the bot username).
    async fn verify(&self) -> Result<String>;

    /// Returns the channel type name (e.g., `"telegram"`).
    fn channel_name(&self) -> &str;
}
