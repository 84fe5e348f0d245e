use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network unavailable")]
    Offline,

    #[error("Request to {url} failed with status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(url: &str, status: u16, body: &str) -> Self {
        match status {
            429 => FetchError::RateLimited,
            _ => FetchError::Status {
                url: url.to_string(),
                status,
                body: Self::truncate_body(body),
            },
        }
    }

    /// True when the failure means the network itself could not be reached,
    /// as opposed to the server answering with an error.
    pub fn is_network_failure(&self) -> bool {
        match self {
            FetchError::Offline | FetchError::Connection(_) => true,
            FetchError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_truncates_long_bodies() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        match FetchError::from_status("/data/faq.json", 500, &body) {
            FetchError::Status { status, body, .. } => {
                assert_eq!(status, 500);
                assert!(body.contains("truncated"));
                assert!(body.len() < MAX_ERROR_BODY_LENGTH + 60);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_status_rate_limited() {
        assert!(matches!(
            FetchError::from_status("/", 429, ""),
            FetchError::RateLimited
        ));
    }

    #[test]
    fn test_network_failure_classification() {
        assert!(FetchError::Offline.is_network_failure());
        assert!(FetchError::Connection("refused".into()).is_network_failure());
        assert!(!FetchError::from_status("/", 404, "missing").is_network_failure());
    }
}
