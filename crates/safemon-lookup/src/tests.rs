use crate::safe_browsing::{canonical_lookup_url, correlate_matches};
use crate::{LookupError, SafeBrowsingClient, SafeBrowsingConfig, ThreatLookup};
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn malware_match(url: &str) -> Value {
    json!({
        "threatType": "MALWARE",
        "platformType": "ANY_PLATFORM",
        "threatEntryType": "URL",
        "threat": { "url": url },
        "cacheDuration": "300s"
    })
}

#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<Value>>>,
    keys: Arc<Mutex<Vec<String>>>,
    queries: Arc<Mutex<Vec<Option<String>>>>,
}

/// Starts a fake threat service answering every request with `reply`.
async fn spawn_service(status: StatusCode, reply: Value) -> (String, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route(
            "/find",
            post(
                move |State(rec): State<Recorded>,
                      RawQuery(query): RawQuery,
                      headers: HeaderMap,
                      Json(body): Json<Value>| {
                    let reply = reply.clone();
                    async move {
                        rec.bodies.lock().unwrap().push(body);
                        rec.queries.lock().unwrap().push(query);
                        rec.keys.lock().unwrap().push(
                            headers
                                .get("x-goog-api-key")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default()
                                .to_string(),
                        );
                        (status, Json(reply))
                    }
                },
            ),
        )
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/find"), recorded)
}

fn client(endpoint: &str, api_key: Option<&str>) -> SafeBrowsingClient {
    SafeBrowsingClient::new(SafeBrowsingConfig {
        api_key: api_key.map(str::to_string),
        endpoint: endpoint.to_string(),
        timeout_secs: 5,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn canonical_url_adds_neutral_scheme() {
    assert_eq!(canonical_lookup_url("a.test"), "http://a.test");
    assert_eq!(canonical_lookup_url("https://a.test"), "https://a.test");
    assert_eq!(canonical_lookup_url("httpbin.test"), "http://httpbin.test");
}

#[test]
fn correlate_without_matches_marks_all_safe() {
    let input = hosts(&["a.test", "b.test"]);
    let results = correlate_matches(&input, Vec::new()).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.values().all(|v| v.is_safe && v.threats.is_empty()));
}

#[test]
fn correlate_prefers_exact_host_over_substring() {
    let input = hosts(&["example.com", "test.example.com"]);
    let results = correlate_matches(&input, vec![malware_match("http://test.example.com/")]).unwrap();
    assert!(results["example.com"].is_safe);
    assert!(!results["test.example.com"].is_safe);
}

#[test]
fn correlate_falls_back_to_longest_containing_host() {
    let input = hosts(&["example.com", "shop.example.com"]);
    let results =
        correlate_matches(&input, vec![malware_match("http://shop.example.com.evil.test/x")]).unwrap();
    assert!(results["example.com"].is_safe);
    assert!(!results["shop.example.com"].is_safe);
}

#[test]
fn correlate_keeps_every_match_for_a_host() {
    let input = hosts(&["a.test"]);
    let mut second = malware_match("http://a.test/");
    second["threatType"] = json!("SOCIAL_ENGINEERING");
    let results = correlate_matches(&input, vec![malware_match("http://a.test/"), second]).unwrap();

    let verdict = &results["a.test"];
    assert!(!verdict.is_safe);
    assert_eq!(verdict.threat_types(), vec!["MALWARE", "SOCIAL_ENGINEERING"]);
    assert_eq!(verdict.raw_response["matches"].as_array().unwrap().len(), 2);
    assert_eq!(verdict.threats[0].cache_duration.as_deref(), Some("300s"));
}

#[test]
fn correlate_ignores_unattributable_match() {
    let input = hosts(&["a.test"]);
    let results = correlate_matches(&input, vec![malware_match("http://other.test/")]).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results["a.test"].is_safe);
}

#[test]
fn correlate_returns_one_verdict_per_distinct_host() {
    let input = hosts(&["a.test", "b.test", "a.test"]);
    let results = correlate_matches(&input, vec![malware_match("http://a.test")]).unwrap();
    assert_eq!(results.len(), 2);
    assert!(!results["a.test"].is_safe);
}

#[tokio::test]
async fn missing_api_key_fails_before_network() {
    let c = client("http://127.0.0.1:9/find", None);
    let err = c.check_domains(&hosts(&["a.test"])).await.unwrap_err();
    assert!(err.is_configuration());

    // Credentials are checked before the empty-input short circuit.
    let err = c.check_domains(&[]).await.unwrap_err();
    assert!(err.is_configuration());

    let empty_key = client("http://127.0.0.1:9/find", Some(""));
    assert!(empty_key.check_domains(&[]).await.unwrap_err().is_configuration());
}

#[tokio::test]
async fn empty_input_makes_no_request() {
    let (endpoint, recorded) = spawn_service(StatusCode::OK, json!({})).await;
    let results = client(&endpoint, Some("k")).check_domains(&[]).await.unwrap();
    assert!(results.is_empty());
    assert!(recorded.bodies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn batches_all_hosts_in_one_request() {
    let (endpoint, recorded) = spawn_service(StatusCode::OK, json!({})).await;
    let results = client(&endpoint, Some("secret-key"))
        .check_domains(&hosts(&["a.test", "b.test"]))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results["a.test"].is_safe);
    assert!(results["b.test"].is_safe);

    let bodies = recorded.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["client"]["clientId"], "domain-safety-monitor");
    assert_eq!(body["threatInfo"]["platformTypes"], json!(["ANY_PLATFORM"]));
    assert_eq!(body["threatInfo"]["threatEntryTypes"], json!(["URL"]));
    assert_eq!(
        body["threatInfo"]["threatTypes"],
        json!(["MALWARE", "SOCIAL_ENGINEERING", "UNWANTED_SOFTWARE", "POTENTIALLY_HARMFUL_APPLICATION"])
    );
    assert_eq!(
        body["threatInfo"]["threatEntries"],
        json!([{ "url": "http://a.test" }, { "url": "http://b.test" }])
    );
    assert_eq!(recorded.keys.lock().unwrap().as_slice(), ["secret-key"]);
    assert_eq!(recorded.queries.lock().unwrap().as_slice(), [None]);
}

#[tokio::test]
async fn flagged_host_is_reported_unsafe() {
    let (endpoint, _) =
        spawn_service(StatusCode::OK, json!({ "matches": [malware_match("http://a.test")] })).await;
    let results = client(&endpoint, Some("k"))
        .check_domains(&hosts(&["a.test", "b.test"]))
        .await
        .unwrap();

    assert!(!results["a.test"].is_safe);
    assert_eq!(results["a.test"].threat_types(), vec!["MALWARE"]);
    assert!(results["b.test"].is_safe);
}

#[tokio::test]
async fn error_status_fails_the_batch() {
    let (endpoint, _) = spawn_service(
        StatusCode::FORBIDDEN,
        json!({ "error": { "code": 403, "message": "API key not valid" } }),
    )
    .await;
    let err = client(&endpoint, Some("bad"))
        .check_domains(&hosts(&["a.test"]))
        .await
        .unwrap_err();
    match err {
        LookupError::Status { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("API key not valid"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unreachable_service_is_a_lookup_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}/find"), Some("SUPERSECRETKEY123"))
        .check_domains(&hosts(&["a.test"]))
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::Http(_)));
    assert!(!err.to_string().contains("SUPERSECRETKEY123"));
    assert!(!format!("{err:?}").contains("SUPERSECRETKEY123"));
}

#[tokio::test]
async fn transport_errors_drop_the_request_url() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    // Even a secret smuggled into the endpoint itself stays out of the message.
    let err = client(&format!("http://{addr}/find?key=LEGACYKEY"), Some("k"))
        .check_domains(&hosts(&["a.test"]))
        .await
        .unwrap_err();
    assert!(!err.to_string().contains("LEGACYKEY"));
    assert!(!err.to_string().contains(&addr.to_string()));
}

#[tokio::test]
async fn invalid_endpoint_is_a_configuration_error() {
    let err = client("not a url", Some("k"))
        .check_domains(&hosts(&["a.test"]))
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}
