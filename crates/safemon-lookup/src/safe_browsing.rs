use crate::error::{LookupError, Result};
use crate::ThreatLookup;
use reqwest::Client;
use safemon_common::types::{LookupVerdict, ThreatMatch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://safebrowsing.googleapis.com/v4/threatMatches:find";

/// Threat categories requested on every lookup.
pub const THREAT_TYPES: [&str; 4] = [
    "MALWARE",
    "SOCIAL_ENGINEERING",
    "UNWANTED_SOFTWARE",
    "POTENTIALLY_HARMFUL_APPLICATION",
];

/// The key travels in a header rather than the `key` query parameter so it
/// never appears in a request URL.
const API_KEY_HEADER: &str = "X-Goog-Api-Key";

/// Error bodies are cut to this many bytes before they land in an error.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct SafeBrowsingConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub client_id: String,
    pub client_version: String,
    pub timeout_secs: u64,
}

impl Default for SafeBrowsingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client_id: "domain-safety-monitor".to_string(),
            client_version: "1.0.0".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FindRequest<'a> {
    client: ClientInfo<'a>,
    threat_info: ThreatInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfo<'a> {
    client_id: &'a str,
    client_version: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreatInfo {
    threat_types: Vec<&'static str>,
    platform_types: Vec<&'static str>,
    threat_entry_types: Vec<&'static str>,
    threat_entries: Vec<ThreatEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ThreatEntry {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    matches: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchRecord {
    threat_type: String,
    #[serde(default)]
    platform_type: String,
    #[serde(default)]
    threat_entry_type: String,
    threat: ThreatEntry,
    cache_duration: Option<String>,
}

/// Google Safe Browsing v4 client.
pub struct SafeBrowsingClient {
    config: SafeBrowsingConfig,
    client: Client,
}

impl SafeBrowsingClient {
    pub fn new(config: SafeBrowsingConfig) -> Result<Self> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LookupError::Configuration("Safe Browsing API key not configured".into()))
    }

    fn request_body<'a>(&'a self, hostnames: &[String]) -> FindRequest<'a> {
        FindRequest {
            client: ClientInfo {
                client_id: &self.config.client_id,
                client_version: &self.config.client_version,
            },
            threat_info: ThreatInfo {
                threat_types: THREAT_TYPES.to_vec(),
                platform_types: vec!["ANY_PLATFORM"],
                threat_entry_types: vec!["URL"],
                threat_entries: hostnames
                    .iter()
                    .map(|h| ThreatEntry {
                        url: canonical_lookup_url(h),
                    })
                    .collect(),
            },
        }
    }
}

#[async_trait::async_trait]
impl ThreatLookup for SafeBrowsingClient {
    fn name(&self) -> &str {
        "safe-browsing"
    }

    async fn check_domains(&self, hostnames: &[String]) -> Result<HashMap<String, LookupVerdict>> {
        let api_key = self.api_key()?;
        if hostnames.is_empty() {
            return Ok(HashMap::new());
        }

        let url = Url::parse(&self.config.endpoint).map_err(|e| {
            LookupError::Configuration(format!("invalid endpoint '{}': {e}", self.config.endpoint))
        })?;

        tracing::info!(count = hostnames.len(), "Checking domains with Safe Browsing");
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(&self.request_body(hostnames))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "Safe Browsing API returned an error");
            return Err(LookupError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        let parsed: FindResponse = if body.trim().is_empty() {
            FindResponse { matches: Vec::new() }
        } else {
            serde_json::from_str(&body)?
        };
        if parsed.matches.is_empty() {
            tracing::info!("No threat matches reported");
        } else {
            tracing::warn!(matches = parsed.matches.len(), "Threat matches reported");
        }

        correlate_matches(hostnames, parsed.matches)
    }
}

/// Lookup form of a hostname: a neutral `http://` scheme is added unless one
/// is already present.
pub fn canonical_lookup_url(hostname: &str) -> String {
    if hostname.starts_with("http://") || hostname.starts_with("https://") {
        hostname.to_string()
    } else {
        format!("http://{hostname}")
    }
}

fn host_key(value: &str) -> String {
    Url::parse(&canonical_lookup_url(value))
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_end_matches('.').to_lowercase()))
        .unwrap_or_else(|| value.to_lowercase())
}

fn strip_scheme(value: &str) -> &str {
    value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .unwrap_or(value)
}

/// Attributes a reported match URL to one of the requested hostnames.
///
/// Exact host equality wins. Otherwise the longest hostname contained in
/// the match URL is chosen, so `a.example.com` beats `example.com`.
fn attribute<'a>(hostnames: &'a [String], match_url: &str) -> Option<&'a String> {
    let match_host = host_key(match_url);
    if let Some(exact) = hostnames.iter().find(|h| host_key(h) == match_host) {
        return Some(exact);
    }

    let lowered = match_url.to_lowercase();
    hostnames
        .iter()
        .filter(|h| {
            let bare = strip_scheme(h).to_lowercase();
            !bare.is_empty() && lowered.contains(&bare)
        })
        .fold(None, |best: Option<&String>, h| match best {
            Some(b) if strip_scheme(b).len() >= strip_scheme(h).len() => Some(b),
            _ => Some(h),
        })
}

/// Builds the per-hostname verdict map from the raw match records.
///
/// Every hostname starts out safe; each attributed match marks its hostname
/// unsafe and appends one threat. The raw response kept for a hostname is
/// `{"matches": [...]}` with the verbatim records attributed to it.
pub fn correlate_matches(
    hostnames: &[String],
    matches: Vec<serde_json::Value>,
) -> Result<HashMap<String, LookupVerdict>> {
    let mut threats: HashMap<&String, Vec<ThreatMatch>> = HashMap::new();
    let mut raw: HashMap<&String, Vec<serde_json::Value>> = HashMap::new();

    for value in matches {
        let record: MatchRecord = serde_json::from_value(value.clone())?;
        let Some(host) = attribute(hostnames, &record.threat.url) else {
            tracing::warn!(url = %record.threat.url, "Threat match does not correspond to any requested domain");
            continue;
        };
        threats.entry(host).or_default().push(ThreatMatch {
            threat_type: record.threat_type,
            platform_type: record.platform_type,
            threat_entry_type: record.threat_entry_type,
            cache_duration: record.cache_duration,
        });
        raw.entry(host).or_default().push(value);
    }

    let mut results = HashMap::with_capacity(hostnames.len());
    for host in hostnames {
        let verdict = match threats.remove(host) {
            Some(found) => LookupVerdict {
                is_safe: false,
                threats: found,
                raw_response: serde_json::json!({ "matches": raw.remove(host).unwrap_or_default() }),
            },
            None => results
                .remove(host)
                .unwrap_or_else(LookupVerdict::safe),
        };
        results.insert(host.clone(), verdict);
    }
    Ok(results)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
