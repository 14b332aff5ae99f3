use thiserror::Error;

// Basic error handling with thiserror
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("URL encoding failed: {0}")]
    UrlEncodingFailed(#[from] serde_urlencoded::ser::Error),

    #[error("URL parsing failed: {0}")]
    UrlParseFailed(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Runtime configuration unavailable: {0}")]
    ConfigurationUnavailable(String),

    #[error("Code exchange failed: {0}")]
    ExchangeError(String),

    #[error("Token refresh failed: {0}")]
    RefreshError(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Access token rejected: {0}")]
    Unauthorized(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SessionError {
    /// Whether recovering from this error means throwing away every cached
    /// token and sending the user through authorization again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            SessionError::ExchangeError(_) | SessionError::RefreshError(_)
        )
    }

    /// Failures of remote playback queries or commands. The current update
    /// cycle is skipped and the next timer tick or user action retries.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            SessionError::UpstreamUnavailable(_)
                | SessionError::Unauthorized(_)
                | SessionError::RequestFailed(_)
        )
    }

    pub(crate) fn upstream(context: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("{context}: {status}: {body}");
        if status == reqwest::StatusCode::UNAUTHORIZED {
            SessionError::Unauthorized(message)
        } else {
            SessionError::UpstreamUnavailable(message)
        }
    }
}
