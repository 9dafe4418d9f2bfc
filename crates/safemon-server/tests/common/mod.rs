#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use safemon_common::types::{
    Category, Domain, DomainStats, LookupVerdict, RecentScan, ScanVerdict, ThreatMatch,
};
use safemon_lookup::{LookupError, ThreatLookup};
use safemon_notify::{NotificationChannel, NotificationManager, NotifyError};
use safemon_server::app;
use safemon_server::config::{ServerConfig, TriggerConfig};
use safemon_server::scan::{ScanOrchestrator, ScanTrigger};
use safemon_server::state::AppState;
use safemon_storage::{DomainRegistry, ScanResultStore, SqliteStore, StorageError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const TEST_SECRET: &str = "test-cron-secret";

#[derive(Debug, Clone, Copy)]
pub enum FakeFailure {
    Configuration,
    Unavailable,
}

/// Scriptable threat lookup: every hostname is safe unless flagged.
#[derive(Default)]
pub struct FakeLookup {
    flagged: Mutex<HashMap<String, Vec<String>>>,
    failure: Mutex<Option<FakeFailure>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FakeLookup {
    pub fn flag(&self, hostname: &str, threats: &[&str]) {
        self.flagged.lock().unwrap().insert(
            hostname.to_string(),
            threats.iter().map(|t| t.to_string()).collect(),
        );
    }

    pub fn clear(&self, hostname: &str) {
        self.flagged.lock().unwrap().remove(hostname);
    }

    pub fn fail_with(&self, failure: Option<FakeFailure>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThreatLookup for FakeLookup {
    fn name(&self) -> &str {
        "fake"
    }

    async fn check_domains(
        &self,
        hostnames: &[String],
    ) -> Result<HashMap<String, LookupVerdict>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = *self.failure.lock().unwrap();
        match failure {
            Some(FakeFailure::Configuration) => {
                return Err(LookupError::Configuration("api key missing".to_string()))
            }
            Some(FakeFailure::Unavailable) => {
                return Err(LookupError::Status {
                    status: 503,
                    body: "service unavailable".to_string(),
                })
            }
            None => {}
        }

        let flagged = self.flagged.lock().unwrap().clone();
        Ok(hostnames
            .iter()
            .map(|host| {
                let verdict = match flagged.get(host) {
                    Some(threats) => {
                        let matches: Vec<Value> = threats
                            .iter()
                            .map(|t| {
                                json!({
                                    "threatType": t,
                                    "platformType": "ANY_PLATFORM",
                                    "threatEntryType": "URL",
                                    "threat": { "url": format!("https://{host}/") },
                                    "cacheDuration": "300s",
                                })
                            })
                            .collect();
                        LookupVerdict {
                            is_safe: false,
                            threats: threats
                                .iter()
                                .map(|t| ThreatMatch {
                                    threat_type: t.clone(),
                                    platform_type: "ANY_PLATFORM".to_string(),
                                    threat_entry_type: "URL".to_string(),
                                    cache_duration: Some("300s".to_string()),
                                })
                                .collect(),
                            raw_response: json!({ "matches": matches }),
                        }
                    }
                    None => LookupVerdict::safe(),
                };
                (host.clone(), verdict)
            })
            .collect())
    }
}

/// Channel that keeps every delivered message.
pub struct RecordingChannel {
    pub sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send_message(&self, text: &str) -> safemon_notify::Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn verify(&self) -> safemon_notify::Result<String> {
        Ok("recording_bot".to_string())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

/// Channel whose every delivery is rejected by the remote API.
pub struct FailingChannel {
    pub attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl NotificationChannel for FailingChannel {
    async fn send_message(&self, _text: &str) -> safemon_notify::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::ApiError {
            service: "telegram".to_string(),
            status: 500,
            body: "down".to_string(),
        })
    }

    async fn verify(&self) -> safemon_notify::Result<String> {
        Err(NotifyError::InvalidConfig("unreachable".to_string()))
    }

    fn channel_name(&self) -> &str {
        "failing"
    }
}

/// Result store that delegates reads to SQLite and can be told to reject
/// writes.
pub struct FlakyResultStore {
    inner: Arc<SqliteStore>,
    fail_writes: AtomicBool,
}

impl FlakyResultStore {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> safemon_storage::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Other("disk full".to_string()));
        }
        Ok(())
    }
}

impl ScanResultStore for FlakyResultStore {
    fn append_verdict(&self, verdict: &ScanVerdict) -> safemon_storage::Result<()> {
        self.check_writable()?;
        self.inner.append_verdict(verdict)
    }

    fn append_verdicts(&self, verdicts: &[ScanVerdict]) -> safemon_storage::Result<()> {
        self.check_writable()?;
        self.inner.append_verdicts(verdicts)
    }

    fn most_recent_verdict(&self, domain_id: &str) -> safemon_storage::Result<Option<ScanVerdict>> {
        self.inner.most_recent_verdict(domain_id)
    }

    fn recent_scans(&self, limit: usize) -> safemon_storage::Result<Vec<RecentScan>> {
        self.inner.recent_scans(limit)
    }

    fn domain_stats(&self) -> safemon_storage::Result<DomainStats> {
        self.inner.domain_stats()
    }
}

pub struct TestContext {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub results: Arc<FlakyResultStore>,
    pub lookup: Arc<FakeLookup>,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub orchestrator: Arc<ScanOrchestrator>,
    pub trigger: ScanTrigger,
    pub state: AppState,
    pub app: axum::Router,
}

impl TestContext {
    pub fn add_domain(&self, hostname: &str) -> Domain {
        self.store
            .add_domain(hostname, "", None)
            .expect("domain should be added")
    }

    pub fn add_domain_in(&self, hostname: &str, category: &Category) -> Domain {
        self.store
            .add_domain(hostname, "", Some(&category.id))
            .expect("domain should be added")
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn verdict_count(&self, domain: &Domain) -> usize {
        self.store
            .recent_scans(10_000)
            .expect("recent scans should load")
            .iter()
            .filter(|s| s.domain == domain.domain)
            .count()
    }
}

pub struct TestOptions<'a> {
    pub secret: Option<&'a str>,
    pub notify_summary: bool,
}

impl Default for TestOptions<'_> {
    fn default() -> Self {
        Self {
            secret: Some(TEST_SECRET),
            notify_summary: false,
        }
    }
}

pub fn build_test_context() -> TestContext {
    build_test_context_with(TestOptions::default())
}

pub fn build_test_context_with(options: TestOptions<'_>) -> TestContext {
    safemon_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir().expect("temp dir should be created");
    let store = Arc::new(SqliteStore::new(temp_dir.path()).expect("store should open"));
    let results = Arc::new(FlakyResultStore::new(store.clone()));
    let lookup = Arc::new(FakeLookup::default());
    let sent = Arc::new(Mutex::new(Vec::new()));

    let notifier = Arc::new(NotificationManager::new(
        Some(Box::new(RecordingChannel { sent: sent.clone() })),
        Some("https://dash.example".to_string()),
    ));
    let orchestrator = Arc::new(
        ScanOrchestrator::new(store.clone(), results.clone(), lookup.clone(), notifier)
            .with_summary_notifications(options.notify_summary),
    );
    let trigger = ScanTrigger::new(orchestrator.clone()).with_lease(store.clone(), 60);

    let config = ServerConfig {
        data_dir: temp_dir.path().to_string_lossy().to_string(),
        trigger: TriggerConfig {
            secret: options.secret.map(str::to_string),
        },
        ..Default::default()
    };

    let state = AppState {
        registry: store.clone(),
        results: results.clone(),
        trigger: trigger.clone(),
        start_time: Utc::now(),
        config: Arc::new(config),
    };
    let app = app::build_http_app(state.clone());

    TestContext {
        temp_dir,
        store,
        results,
        lookup,
        sent,
        orchestrator,
        trigger,
        state,
        app,
    }
}

/// Orchestrator over the given store with a custom notification channel.
pub fn orchestrator_with_channel(
    store: Arc<SqliteStore>,
    lookup: Arc<FakeLookup>,
    channel: Box<dyn NotificationChannel>,
) -> ScanOrchestrator {
    ScanOrchestrator::new(
        store.clone(),
        store,
        lookup,
        Arc::new(NotificationManager::new(Some(channel), None)),
    )
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let req = builder.body(Body::empty()).expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}
