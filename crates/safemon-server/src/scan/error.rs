use safemon_lookup::LookupError;
use safemon_storage::StorageError;
use serde::Serialize;

/// Pipeline stage of a scan cycle. A cycle that fails reports the stage it
/// was in; notification failures never surface here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    AcquiringLease,
    FetchingDomains,
    LookingUp,
    Persisting,
}

impl std::fmt::Display for ScanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanStage::AcquiringLease => "acquiring_lease",
            ScanStage::FetchingDomains => "fetching_domains",
            ScanStage::LookingUp => "looking_up",
            ScanStage::Persisting => "persisting",
        };
        f.write_str(s)
    }
}

/// Why a scan cycle failed. No verdicts are persisted for a failed cycle.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// A required credential is missing; raised before any network I/O.
    #[error("Scan: configuration error: {0}")]
    Configuration(String),

    /// The threat service was unreachable or answered with an error.
    #[error("Scan: lookup failed: {0}")]
    Lookup(#[source] LookupError),

    /// The store rejected a read or write.
    #[error("Scan: persistence failed while {stage}: {source}")]
    Persistence {
        stage: ScanStage,
        #[source]
        source: StorageError,
    },
}

impl ScanError {
    pub fn persistence(stage: ScanStage, source: StorageError) -> Self {
        ScanError::Persistence { stage, source }
    }

    pub fn stage(&self) -> ScanStage {
        match self {
            ScanError::Configuration(_) | ScanError::Lookup(_) => ScanStage::LookingUp,
            ScanError::Persistence { stage, .. } => *stage,
        }
    }
}

impl From<LookupError> for ScanError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::Configuration(msg) => ScanError::Configuration(msg),
            other => ScanError::Lookup(other),
        }
    }
}
