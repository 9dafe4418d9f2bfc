use chrono::Utc;
use safemon_common::types::{FlagTransitionEvent, ScanCycleResult, ScanVerdict};
use safemon_lookup::{LookupError, ThreatLookup};
use safemon_notify::NotificationManager;
use safemon_storage::{DomainRegistry, ScanResultStore};
use std::sync::Arc;
use std::time::Instant;

use super::error::{ScanError, ScanStage};

/// Runs one scan cycle: active domains, one batched lookup, transition
/// detection against the stored history, one atomic write, one alert.
///
/// Holds no state between cycles; everything that crosses cycles lives in
/// the [`ScanResultStore`].
pub struct ScanOrchestrator {
    registry: Arc<dyn DomainRegistry>,
    results: Arc<dyn ScanResultStore>,
    lookup: Arc<dyn ThreatLookup>,
    notifier: Arc<NotificationManager>,
    notify_summary: bool,
}

impl ScanOrchestrator {
    pub fn new(
        registry: Arc<dyn DomainRegistry>,
        results: Arc<dyn ScanResultStore>,
        lookup: Arc<dyn ThreatLookup>,
        notifier: Arc<NotificationManager>,
    ) -> Self {
        Self {
            registry,
            results,
            lookup,
            notifier,
            notify_summary: false,
        }
    }

    /// Also send a scan-complete summary after every successful cycle.
    pub fn with_summary_notifications(mut self, enabled: bool) -> Self {
        self.notify_summary = enabled;
        self
    }

    pub async fn run_scan(&self) -> Result<ScanCycleResult, ScanError> {
        let started = Instant::now();
        tracing::info!(lookup = self.lookup.name(), "Starting domain safety scan");

        let domains = self
            .registry
            .list_active()
            .map_err(|e| ScanError::persistence(ScanStage::FetchingDomains, e))?;
        if domains.is_empty() {
            tracing::info!("No domains to scan");
            return Ok(ScanCycleResult::default());
        }
        tracing::info!(count = domains.len(), "Scanning active domains");

        let hostnames: Vec<String> = domains.iter().map(|d| d.domain.clone()).collect();
        let mut verdicts = self.lookup.check_domains(&hostnames).await.map_err(|e| {
            tracing::error!(error = %e, "Threat lookup failed, aborting cycle");
            ScanError::from(e)
        })?;
        tracing::info!(results = verdicts.len(), "Threat lookup finished");

        // Every prior is read before anything from this cycle is written.
        let scanned_at = Utc::now();
        let mut cycle = ScanCycleResult::default();
        let mut records = Vec::with_capacity(domains.len());
        let mut transitions = Vec::new();

        for domain in &domains {
            let verdict = verdicts
                .remove(&domain.domain)
                .ok_or_else(|| ScanError::Lookup(LookupError::MissingVerdict(domain.domain.clone())))?;
            let prior = self
                .results
                .most_recent_verdict(&domain.id)
                .map_err(|e| ScanError::persistence(ScanStage::Persisting, e))?;
            let was_previously_safe = prior.map_or(true, |p| p.is_safe);

            cycle.scanned += 1;
            if verdict.is_safe {
                cycle.safe += 1;
                tracing::info!(domain = %domain.domain, "SAFE");
            } else {
                cycle.flagged += 1;
                let threat_types = verdict.threat_types();
                tracing::warn!(domain = %domain.domain, threats = ?threat_types, "FLAGGED");
                if was_previously_safe {
                    cycle.new_flags += 1;
                    transitions.push(FlagTransitionEvent {
                        domain: domain.domain.clone(),
                        category: domain.category_name.clone(),
                        threats: threat_types,
                        detected_at: scanned_at,
                    });
                }
            }
            records.push(ScanVerdict::from_lookup(&domain.id, scanned_at, verdict));
        }

        self.results
            .append_verdicts(&records)
            .map_err(|e| ScanError::persistence(ScanStage::Persisting, e))?;

        tracing::info!(
            scanned = cycle.scanned,
            safe = cycle.safe,
            flagged = cycle.flagged,
            new_flags = cycle.new_flags,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Scan summary"
        );

        if !transitions.is_empty() {
            if let Err(e) = self.notifier.notify_flagged(&transitions).await {
                tracing::warn!(error = %e, count = transitions.len(), "Failed to send flagged-domain alert");
            }
        }
        if self.notify_summary {
            if let Err(e) = self.notifier.notify_summary(&cycle).await {
                tracing::warn!(error = %e, "Failed to send scan summary");
            }
        }

        Ok(cycle)
    }
}
