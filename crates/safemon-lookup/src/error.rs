/// Errors raised while classifying domains against the threat service.
///
/// [`LookupError::Configuration`] is raised before any network I/O; every
/// other variant means the batch failed and no verdict is usable.
///
/// # Examples
///
/// ```rust
/// use safemon_lookup::error::LookupError;
///
/// let err = LookupError::Configuration("api key missing".to_string());
/// assert!(err.is_configuration());
/// assert!(err.to_string().contains("api key missing"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// Credentials or endpoint are absent or malformed.
    #[error("Lookup: configuration error: {0}")]
    Configuration(String),

    /// An underlying HTTP transport error from `reqwest` (connect, timeout, body read).
    /// The request URL is stripped on conversion so credentials never reach the message.
    #[error("Lookup: network error: {0}")]
    Http(#[source] reqwest::Error),

    /// Non-2xx status code from the threat service.
    #[error("Lookup: HTTP error: status={status}, body={body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("Lookup: JSON error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A requested hostname has no entry in the verdict mapping.
    #[error("Lookup: no verdict returned for {0}")]
    MissingVerdict(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        LookupError::Http(e.without_url())
    }
}

impl LookupError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, LookupError::Configuration(_))
    }
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, LookupError>;
