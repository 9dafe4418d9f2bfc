/// Failures while delivering alerts or talking to the bot API.
///
/// None of these ever fail a scan cycle; the orchestrator logs them and
/// carries on.
///
/// # Examples
///
/// ```rust
/// use safemon_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing chat_id".to_string());
/// assert!(err.to_string().contains("chat_id"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Credentials are absent or empty.
    #[error("Notify: channel not configured: {0}")]
    InvalidConfig(String),

    /// Transport failure (connect, timeout, body read). The request URL,
    /// which carries the bot token, is dropped on conversion.
    #[error("Notify: request failed: {0}")]
    HttpError(#[source] reqwest::Error),

    #[error("Notify: malformed response: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Non-2xx status, or a 2xx body carrying `"ok": false`.
    #[error("Notify: {service} rejected the message (status {status}): {body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::HttpError(e.without_url())
    }
}

impl NotifyError {
    /// Transport failures, rate limits and 5xx answers are worth another
    /// attempt; any other rejection will not change on resend.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::HttpError(_) => true,
            NotifyError::ApiError { status, .. } => *status == 429 || *status >= 500,
            NotifyError::InvalidConfig(_) | NotifyError::JsonError(_) => false,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NotifyError>;
