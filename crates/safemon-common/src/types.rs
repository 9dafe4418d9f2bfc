use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalise a user-supplied hostname into the form stored in the registry:
/// trimmed, lowercase, without `http://`/`https://` and without trailing `/`.
///
/// # Examples
///
/// ```
/// use safemon_common::types::normalize_hostname;
///
/// assert_eq!(normalize_hostname("HTTPS://Example.COM/"), "example.com");
/// assert_eq!(normalize_hostname("  a.test "), "a.test");
/// ```
pub fn normalize_hostname(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    without_scheme.trim_end_matches('/').to_string()
}

/// A monitored hostname. Domains are never hard-deleted; removal clears
/// `is_active` so that scan history stays queryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    /// Normalised hostname, unique across the registry.
    pub domain: String,
    pub is_active: bool,
    pub category_id: Option<String>,
    /// Category name, joined in when listing.
    pub category_name: Option<String>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Grouping label for domains, shown in alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

/// One threat classification reported by the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatMatch {
    pub threat_type: String,
    pub platform_type: String,
    pub threat_entry_type: String,
    /// Cache duration advertised by the service (e.g. `"300s"`).
    pub cache_duration: Option<String>,
}

/// Lookup outcome for a single hostname, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupVerdict {
    pub is_safe: bool,
    pub threats: Vec<ThreatMatch>,
    /// Verbatim match records attributed to this hostname.
    pub raw_response: serde_json::Value,
}

impl LookupVerdict {
    /// The default verdict: safe, no threats, no matches.
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            threats: Vec::new(),
            raw_response: serde_json::json!({ "matches": [] }),
        }
    }

    pub fn threat_types(&self) -> Vec<String> {
        self.threats.iter().map(|t| t.threat_type.clone()).collect()
    }
}

/// A persisted scan result. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanVerdict {
    pub id: String,
    pub domain_id: String,
    pub scanned_at: DateTime<Utc>,
    pub is_safe: bool,
    pub threats: Vec<ThreatMatch>,
    pub raw_response: serde_json::Value,
}

impl ScanVerdict {
    pub fn from_lookup(domain_id: &str, scanned_at: DateTime<Utc>, verdict: LookupVerdict) -> Self {
        Self {
            id: crate::id::next_id(),
            domain_id: domain_id.to_string(),
            scanned_at,
            is_safe: verdict.is_safe,
            threats: verdict.threats,
            raw_response: verdict.raw_response,
        }
    }

    pub fn threat_types(&self) -> Vec<String> {
        self.threats.iter().map(|t| t.threat_type.clone()).collect()
    }
}

/// Summary of one scan cycle. Returned to the caller, never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCycleResult {
    pub scanned: usize,
    pub safe: usize,
    pub flagged: usize,
    /// Domains that went from safe (or never scanned) to flagged this cycle.
    pub new_flags: usize,
}

/// A domain newly flagged during the current cycle; drives one alert line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagTransitionEvent {
    pub domain: String,
    pub category: Option<String>,
    pub threats: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

/// Row of the recent-scans listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentScan {
    pub domain: String,
    pub scanned_at: DateTime<Utc>,
    pub is_safe: bool,
    pub threat_types: Vec<String>,
}

/// Counts over active domains based on each domain's current verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainStats {
    pub total_domains: u64,
    pub safe_domains: u64,
    pub flagged_domains: u64,
    pub unscanned_domains: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_scheme_and_case() {
        assert_eq!(normalize_hostname("http://A.Test"), "a.test");
        assert_eq!(normalize_hostname("https://b.test/"), "b.test");
        assert_eq!(normalize_hostname("c.test"), "c.test");
        assert_eq!(normalize_hostname("   "), "");
    }

    #[test]
    fn safe_verdict_has_no_threats() {
        let v = LookupVerdict::safe();
        assert!(v.is_safe);
        assert!(v.threats.is_empty());
        assert_eq!(v.raw_response["matches"], serde_json::json!([]));
    }

    #[test]
    fn scan_verdict_keeps_threat_order() {
        let lookup = LookupVerdict {
            is_safe: false,
            threats: vec![
                ThreatMatch {
                    threat_type: "MALWARE".into(),
                    platform_type: "ANY_PLATFORM".into(),
                    threat_entry_type: "URL".into(),
                    cache_duration: Some("300s".into()),
                },
                ThreatMatch {
                    threat_type: "SOCIAL_ENGINEERING".into(),
                    platform_type: "ANY_PLATFORM".into(),
                    threat_entry_type: "URL".into(),
                    cache_duration: None,
                },
            ],
            raw_response: serde_json::json!({ "matches": [] }),
        };
        let verdict = ScanVerdict::from_lookup("42", Utc::now(), lookup);
        assert_eq!(verdict.domain_id, "42");
        assert_eq!(verdict.threat_types(), vec!["MALWARE", "SOCIAL_ENGINEERING"]);
    }
}
