use safemon_common::types::ScanCycleResult;
use safemon_storage::ScanLease;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::error::{ScanError, ScanStage};
use super::orchestrator::ScanOrchestrator;

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Trigger: a scan cycle is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Scan(#[from] ScanError),
}

struct LeaseSlot {
    lease: Arc<dyn ScanLease>,
    holder: String,
    ttl_secs: u64,
}

impl LeaseSlot {
    fn acquire(&self) -> Result<(), TriggerError> {
        match self.lease.try_acquire_scan_lease(&self.holder, self.ttl_secs) {
            Ok(true) => Ok(()),
            Ok(false) => Err(TriggerError::AlreadyRunning),
            Err(e) => Err(ScanError::persistence(ScanStage::AcquiringLease, e).into()),
        }
    }

    fn release(&self) {
        if let Err(e) = self.lease.release_scan_lease(&self.holder) {
            tracing::warn!(error = %e, holder = %self.holder, "Failed to release scan lease, it will expire");
        }
    }
}

/// Single entry point for starting scan cycles.
///
/// Owns the guard that keeps cycles from overlapping: whoever asks while a
/// cycle is running is turned away instead of queued. With a lease attached
/// the guard also spans every process sharing the database.
#[derive(Clone)]
pub struct ScanTrigger {
    orchestrator: Arc<ScanOrchestrator>,
    running: Arc<Mutex<()>>,
    lease: Option<Arc<LeaseSlot>>,
}

impl ScanTrigger {
    pub fn new(orchestrator: Arc<ScanOrchestrator>) -> Self {
        Self {
            orchestrator,
            running: Arc::new(Mutex::new(())),
            lease: None,
        }
    }

    /// Also require the shared scan lease for every cycle. The lease is
    /// dropped when the cycle ends and expires after `ttl_secs` if this
    /// process dies mid-cycle.
    pub fn with_lease(mut self, lease: Arc<dyn ScanLease>, ttl_secs: u64) -> Self {
        let holder = format!("pid{}-{:08x}", std::process::id(), rand::random::<u32>());
        self.lease = Some(Arc::new(LeaseSlot {
            lease,
            holder,
            ttl_secs: ttl_secs.max(1),
        }));
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    fn claim(&self) -> Result<OwnedMutexGuard<()>, TriggerError> {
        let guard = self
            .running
            .clone()
            .try_lock_owned()
            .map_err(|_| TriggerError::AlreadyRunning)?;
        if let Some(slot) = &self.lease {
            slot.acquire()?;
        }
        Ok(guard)
    }

    async fn run_claimed(orchestrator: &ScanOrchestrator, lease: Option<&LeaseSlot>) -> Result<ScanCycleResult, ScanError> {
        let result = orchestrator.run_scan().await;
        if let Some(slot) = lease {
            slot.release();
        }
        result
    }

    /// Runs a cycle and waits for its result.
    pub async fn run_now(&self) -> Result<ScanCycleResult, TriggerError> {
        let _guard = self.claim()?;
        Ok(Self::run_claimed(&self.orchestrator, self.lease.as_deref()).await?)
    }

    /// Claims the guard, then hands the cycle to an independent task and
    /// returns immediately.
    pub fn spawn(&self) -> Result<(), TriggerError> {
        let guard = self.claim()?;
        let orchestrator = self.orchestrator.clone();
        let lease = self.lease.clone();
        tokio::spawn(async move {
            let _guard = guard;
            match Self::run_claimed(&orchestrator, lease.as_deref()).await {
                Ok(result) => {
                    tracing::info!(
                        scanned = result.scanned,
                        flagged = result.flagged,
                        new_flags = result.new_flags,
                        "Background scan finished"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, stage = %e.stage(), "Background scan failed");
                }
            }
        });
        Ok(())
    }
}
