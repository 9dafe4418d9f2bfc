use crate::error::{NotifyError, Result};
use crate::template;
use crate::NotificationChannel;
use safemon_common::types::{FlagTransitionEvent, ScanCycleResult};

/// Front door for alert delivery.
///
/// Holds at most one channel. Without one, flagged and summary
/// notifications succeed immediately without doing anything.
pub struct NotificationManager {
    channel: Option<Box<dyn NotificationChannel>>,
    dashboard_url: Option<String>,
}

impl NotificationManager {
    pub fn new(channel: Option<Box<dyn NotificationChannel>>, dashboard_url: Option<String>) -> Self {
        Self {
            channel,
            dashboard_url: dashboard_url.filter(|u| !u.is_empty()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.channel.as_deref().map(|c| c.channel_name())
    }

    /// Sends one alert for the whole batch. Empty batches send nothing.
    pub async fn notify_flagged(&self, events: &[FlagTransitionEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let Some(channel) = &self.channel else {
            tracing::warn!(count = events.len(), "Notifications not configured, skipping flagged alert");
            return Ok(());
        };
        let message = template::format_flagged_alert(events, self.dashboard_url.as_deref());
        channel.send_message(&message).await
    }

    pub async fn notify_summary(&self, cycle: &ScanCycleResult) -> Result<()> {
        let Some(channel) = &self.channel else {
            return Ok(());
        };
        channel.send_message(&template::format_scan_summary(cycle)).await
    }

    /// Unlike the notify calls this fails when no channel is configured,
    /// since the caller explicitly asked for delivery.
    pub async fn send_test_message(&self) -> Result<()> {
        self.require_channel()?.send_message(template::TEST_MESSAGE).await
    }

    pub async fn verify(&self) -> Result<String> {
        self.require_channel()?.verify().await
    }

    fn require_channel(&self) -> Result<&dyn NotificationChannel> {
        self.channel.as_deref().ok_or_else(|| {
            NotifyError::InvalidConfig("notification channel not configured".into())
        })
    }
}
