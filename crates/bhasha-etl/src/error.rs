//! Error types for adapters and the pipeline.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use thiserror::Error;

/// Errors raised by the external-service adapters and the scorer.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// An HTTP request to an external source failed with a server error.
    #[error("HTTP error from {source_name}: {message}")]
    Http {
        source_name: String,
        message: String,
    },

    /// The external source returned a rate-limit response.
    ///
    /// `retry_after` carries the server's `Retry-After` hint, if any.
    #[error("rate limited by {source_name}")]
    RateLimited {
        source_name: String,
        retry_after: Option<Duration>,
    },

    /// The requested entity was not found at the external source.
    #[error("not found: {entity} at {source_name}")]
    NotFound { entity: String, source_name: String },

    /// A response from an external source could not be parsed.
    #[error("parse error from {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// An error propagated from `reqwest` (connection, timeout, body).
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Credentials were rejected or are missing.
    #[error("authentication failed for {source_name}: {message}")]
    Auth {
        source_name: String,
        message: String,
    },

    /// The source refused the request (4xx other than auth, 404 and 429).
    #[error("{source_name} rejected request with status {status}: {message}")]
    Rejected {
        source_name: String,
        status: u16,
        message: String,
    },

    /// The language scorer could not produce scores.
    #[error("scorer failed: {message}")]
    Scorer { message: String },

    /// Too many consecutive tracks failed against a source.
    #[error("circuit open for {source_name}")]
    CircuitOpen { source_name: String },
}

impl AdapterError {
    /// Returns `true` when the error is transient and the operation may
    /// succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } | Self::RateLimited { .. } => true,
            Self::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Minimum wait the source asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Attach a `Retry-After` hint to a rate-limit error; other errors are
    /// returned unchanged.
    #[must_use]
    pub(crate) fn with_retry_after(self, wait: Option<Duration>) -> Self {
        match self {
            Self::RateLimited { source_name, .. } => Self::RateLimited {
                source_name,
                retry_after: wait,
            },
            other => other,
        }
    }

    /// Returns `true` when the error indicates the entity was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` when the error must end the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::Scorer { .. } | Self::CircuitOpen { .. }
        )
    }

    pub(crate) fn scorer(message: impl Into<String>) -> Self {
        Self::Scorer {
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status to an error.
    pub(crate) fn from_status(source_name: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let source_name = source_name.to_string();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {}", truncate(body, 200))
        };
        match status.as_u16() {
            429 => Self::RateLimited {
                source_name,
                retry_after: None,
            },
            401 | 403 => Self::Auth {
                source_name,
                message,
            },
            404 => Self::NotFound {
                entity: message,
                source_name,
            },
            code if status.is_server_error() => {
                log::debug!("{source_name} returned {code}");
                Self::Http {
                    source_name,
                    message,
                }
            }
            code => Self::Rejected {
                source_name,
                status: code,
                message,
            },
        }
    }
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Convenience alias for adapter results.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("state store error: {0}")]
    Store(#[from] bhasha_core::Error),

    #[error("report error: {0}")]
    Report(#[from] csv::Error),

    #[error("report {path} has an unexpected header")]
    ReportHeader { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for pipeline results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            AdapterError::from_status("Genius", StatusCode::TOO_MANY_REQUESTS, ""),
            AdapterError::RateLimited { .. }
        ));
        assert!(AdapterError::from_status("Spotify", StatusCode::UNAUTHORIZED, "").is_fatal());
        assert!(AdapterError::from_status("Spotify", StatusCode::NOT_FOUND, "").is_not_found());
        assert!(AdapterError::from_status("Spotify", StatusCode::BAD_GATEWAY, "").is_transient());
        let rejected = AdapterError::from_status("Spotify", StatusCode::BAD_REQUEST, "bad uri");
        assert!(!rejected.is_transient());
        assert!(!rejected.is_fatal());
        assert!(rejected.to_string().contains("bad uri"));
    }

    #[test]
    fn test_classifiers_are_disjoint() {
        let errors = [
            AdapterError::RateLimited {
                source_name: "x".into(),
                retry_after: None,
            },
            AdapterError::NotFound {
                entity: "song".into(),
                source_name: "x".into(),
            },
            AdapterError::scorer("boom"),
            AdapterError::CircuitOpen {
                source_name: "x".into(),
            },
        ];
        for error in &errors {
            let flags = [error.is_transient(), error.is_not_found(), error.is_fatal()];
            assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{error}");
        }
    }

    #[test]
    fn test_retry_after_is_attached_to_rate_limits_only() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, " 7 ".parse().unwrap());
        let wait = retry_after(&headers);
        assert_eq!(wait, Some(Duration::from_secs(7)));

        let limited = AdapterError::from_status("Spotify", StatusCode::TOO_MANY_REQUESTS, "")
            .with_retry_after(wait);
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));

        let server = AdapterError::from_status("Spotify", StatusCode::BAD_GATEWAY, "")
            .with_retry_after(wait);
        assert_eq!(server.retry_after(), None);

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_request_builder_errors_are_not_transient() {
        let error = reqwest::Client::new().get("not a url").build().unwrap_err();
        assert!(error.is_builder());
        let error = AdapterError::from(error);
        assert!(!error.is_transient());
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("नमस्ते", 2), "नम");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
