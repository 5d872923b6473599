use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures below the HTTP status line. A response with any status code,
/// 4xx and 5xx included, is not a `TransportError`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Timeout calling webhook {url}")]
    Timeout { url: String },

    #[error("Connection error calling webhook {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Request error calling webhook {url}: {message}")]
    Request { url: String, message: String },

    #[error("HTTP client error: {0}")]
    Build(String),
}

impl TransportError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            TransportError::Connect {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    /// The URL the failed request was addressed to, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            TransportError::Timeout { url }
            | TransportError::Connect { url, .. }
            | TransportError::Request { url, .. } => Some(url),
            TransportError::Build(_) => None,
        }
    }
}
