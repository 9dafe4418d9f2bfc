//! Batched threat classification of monitored hostnames.
//!
//! [`ThreatLookup`] is the seam the scan pipeline depends on; the production
//! implementation is [`safe_browsing::SafeBrowsingClient`], a client of the
//! Google Safe Browsing v4 `threatMatches:find` API.

pub mod error;
pub mod safe_browsing;

#[cfg(test)]
mod tests;

pub use error::{LookupError, Result};
pub use safe_browsing::{SafeBrowsingClient, SafeBrowsingConfig};

use safemon_common::types::LookupVerdict;
use std::collections::HashMap;

/// A client that classifies a batch of hostnames in one call.
#[async_trait::async_trait]
pub trait ThreatLookup: Send + Sync {
    /// Short service name used in logs.
    fn name(&self) -> &str;

    /// Classifies `hostnames` in a single request.
    ///
    /// The returned map holds exactly one verdict per distinct input hostname.
    /// Empty input yields an empty map without network I/O, but missing
    /// credentials are reported first.
    async fn check_domains(&self, hostnames: &[String]) -> Result<HashMap<String, LookupVerdict>>;
}
