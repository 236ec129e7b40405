use std::time::Duration;

use core_events::ErrorKind;
use thiserror::Error;

/// Longest slice of an error body carried into a message.
const DETAIL_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrectionError {
    #[error("no API key configured (set the {0} environment variable)")]
    MissingApiKey(String),
    #[error("credential rejected by the correction service (HTTP {status})")]
    Auth { status: u16 },
    #[error("network error{}: {message}", status_suffix(.status))]
    Network { status: Option<u16>, message: String },
    #[error("rate limited by the correction service, try again later")]
    RateLimited,
    #[error("no complete response within {0:?}")]
    Timeout(Duration),
    #[error("could not encode request: {0}")]
    Encoding(String),
    #[error("malformed response: {0}")]
    InvalidResponse(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl CorrectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CorrectionError::MissingApiKey(_) | CorrectionError::Auth { .. } => ErrorKind::Auth,
            CorrectionError::Network { .. } => ErrorKind::Network,
            CorrectionError::RateLimited => ErrorKind::RateLimit,
            CorrectionError::Timeout(_) => ErrorKind::Timeout,
            CorrectionError::Encoding(_) => ErrorKind::Encoding,
            CorrectionError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    /// Classify a non-success HTTP status. `detail` is the (possibly empty) response body.
    pub fn from_status(status: u16, detail: &str) -> Self {
        match status {
            401 | 403 => CorrectionError::Auth { status },
            429 => CorrectionError::RateLimited,
            _ => CorrectionError::Network {
                status: Some(status),
                message: truncate_detail(detail),
            },
        }
    }

    /// Transport-level failure with no status code.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        CorrectionError::Network {
            status: None,
            message: err.to_string(),
        }
    }
}

fn truncate_detail(detail: &str) -> String {
    let detail = detail.trim();
    if detail.is_empty() {
        return "request failed".to_string();
    }
    let mut out: String = detail.chars().take(DETAIL_MAX_CHARS).collect();
    if detail.chars().nth(DETAIL_MAX_CHARS).is_some() {
        out.push('…');
    }
    out
}

impl From<reqwest::Error> for CorrectionError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => CorrectionError::from_status(status.as_u16(), &err.to_string()),
            None => CorrectionError::transport(err),
        }
    }
}
