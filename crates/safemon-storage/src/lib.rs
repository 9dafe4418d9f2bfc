//! Persistence for the domain registry and the append-only scan history.
//!
//! Both collaborators are expressed as traits so the scan pipeline can be
//! driven against any backend. The default implementation
//! ([`sqlite_store::SqliteStore`]) keeps everything in a single SQLite
//! database with WAL mode enabled.

pub mod error;
pub mod sqlite_store;


pub use error::{Result, StorageError};
pub use sqlite_store::SqliteStore;

use safemon_common::types::{Category, Domain, DomainStats, RecentScan, ScanVerdict};

/// Colour assigned to categories created without one.
pub const DEFAULT_CATEGORY_COLOR: &str = "#6b7280";

/// The authoritative list of monitored domains and their categories.
///
/// Domains are soft-deleted only: [`DomainRegistry::deactivate_domain`]
/// clears the active flag, and re-adding the hostname reactivates the row.
pub trait DomainRegistry: Send + Sync {
    /// Creates a category. Names are unique ignoring case.
    fn add_category(&self, name: &str, color: Option<&str>) -> Result<Category>;

    /// Lists every category ordered by name.
    fn list_categories(&self) -> Result<Vec<Category>>;

    /// Renames and/or recolours a category. At least one field must be given.
    fn update_category(&self, id: &str, name: Option<&str>, color: Option<&str>)
        -> Result<Category>;

    /// Deletes a category after unassigning it from every domain. Returns the
    /// number of active domains that lost the category.
    fn delete_category(&self, id: &str) -> Result<u64>;

    /// Registers a hostname, or reactivates it (overwriting notes and
    /// category) if it is already known.
    fn add_domain(&self, hostname: &str, notes: &str, category_id: Option<&str>)
        -> Result<Domain>;

    /// Soft-deactivates a domain. Returns false when no such domain exists.
    fn deactivate_domain(&self, id: &str) -> Result<bool>;

    fn get_domain_by_name(&self, hostname: &str) -> Result<Option<Domain>>;

    /// Active domains ordered by category name, then hostname.
    fn list_active(&self) -> Result<Vec<Domain>>;
}

/// Append-only history of scan verdicts.
pub trait ScanResultStore: Send + Sync {
    fn append_verdict(&self, verdict: &ScanVerdict) -> Result<()>;

    /// Appends a batch atomically: either every verdict is stored or none is.
    fn append_verdicts(&self, verdicts: &[ScanVerdict]) -> Result<()>;

    /// Latest verdict by timestamp for a domain; ties go to the highest id.
    fn most_recent_verdict(&self, domain_id: &str) -> Result<Option<ScanVerdict>>;

    /// Newest-first listing across all domains, joined with the hostname.
    fn recent_scans(&self, limit: usize) -> Result<Vec<RecentScan>>;

    /// Counts over active domains using each domain's current verdict.
    fn domain_stats(&self) -> Result<DomainStats>;
}

/// Cross-process mutual exclusion for scan cycles.
///
/// Several processes may share one database (the server and a one-shot CLI
/// scan). At most one unexpired lease exists at a time; a lease left behind
/// by a crashed process stops counting once it expires.
pub trait ScanLease: Send + Sync {
    /// Takes or renews the lease for `holder`. Returns false when another
    /// holder owns an unexpired lease.
    fn try_acquire_scan_lease(&self, holder: &str, ttl_secs: u64) -> Result<bool>;

    /// Drops the lease if `holder` owns it.
    fn release_scan_lease(&self, holder: &str) -> Result<()>;
}

/// Returns true for `#RGB` and `#RRGGBB` colour strings.
pub fn is_valid_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
