use tokio::time::{interval, Duration, MissedTickBehavior};

use super::trigger::{ScanTrigger, TriggerError};

/// Fires a scan cycle every `interval_secs`. Failed cycles are logged and
/// retried wholesale on the next tick.
pub struct ScanScheduler {
    trigger: ScanTrigger,
    interval_secs: u64,
    run_on_startup: bool,
}

impl ScanScheduler {
    pub fn new(trigger: ScanTrigger, interval_secs: u64, run_on_startup: bool) -> Self {
        Self {
            trigger,
            interval_secs: interval_secs.max(1),
            run_on_startup,
        }
    }

    pub async fn run(&self) {
        tracing::info!(
            interval_secs = self.interval_secs,
            run_on_startup = self.run_on_startup,
            "Scan scheduler started"
        );

        let mut tick = interval(Duration::from_secs(self.interval_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        if !self.run_on_startup {
            tick.tick().await;
        }
        loop {
            tick.tick().await;
            self.run_once().await;
        }
    }

    async fn run_once(&self) {
        match self.trigger.run_now().await {
            Ok(_) => {}
            Err(TriggerError::AlreadyRunning) => {
                tracing::warn!("Previous scan still running, skipping scheduled cycle");
            }
            Err(TriggerError::Scan(e)) => {
                tracing::error!(error = %e, stage = %e.stage(), "Scheduled scan cycle failed");
            }
        }
    }
}
