//! Error types shared across the engine, the transport and the query layer.

use std::time::Duration;
use thiserror::Error;

/// Boxed error type used for transport failures coming from arbitrary backends.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the crawl engine.
///
/// Only [`CrawlError::Transport`] and [`CrawlError::Timeout`] are subject to the
/// retry policy; every other variant is terminal for the request that produced it.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("failed to build request {method} {url}: {reason}")]
    Build {
        method: String,
        url: String,
        reason: String,
    },

    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("redirected too many times ({times}) while fetching {url}")]
    TooManyRedirects { url: String, times: u32 },

    #[error("invalid redirect location {location:?} from {url}: {reason}")]
    InvalidRedirect {
        url: String,
        location: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("crawl engine already started")]
    AlreadyStarted,

    #[error("crawl engine queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl CrawlError {
    /// Wraps an arbitrary transport failure.
    pub fn transport<E>(url: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        CrawlError::Transport {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Returns true if the failure may be retried by resubmitting the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::Transport { .. } | CrawlError::Timeout { .. })
    }
}

/// Errors reported by the CSS compiler and the XPath engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid CSS selector {selector:?} at offset {offset}: {reason}")]
    InvalidCss {
        selector: String,
        offset: usize,
        reason: String,
    },

    #[error("cannot convert CSS pseudo-class {0:?} to XPath")]
    UnsupportedPseudoClass(String),

    #[error("invalid XPath expression {expr:?} at offset {offset}: {reason}")]
    InvalidXPath {
        expr: String,
        offset: usize,
        reason: String,
    },
}

/// Errors returned by item pipelines.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline {pipeline} rejected item: {reason}")]
    Rejected { pipeline: String, reason: String },

    #[error("pipeline i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        let transport = CrawlError::transport("http://a/", "connection reset");
        let timeout = CrawlError::Timeout {
            url: "http://a/".into(),
            timeout: Duration::from_secs(1),
        };
        let redirects = CrawlError::TooManyRedirects {
            url: "http://a/".into(),
            times: 4,
        };
        let build = CrawlError::Build {
            method: "GET".into(),
            url: "::".into(),
            reason: "relative URL without a base".into(),
        };

        assert!(transport.is_retryable());
        assert!(timeout.is_retryable());
        assert!(!redirects.is_retryable());
        assert!(!build.is_retryable());
    }

    #[test]
    fn messages_name_the_failing_url() {
        let err = CrawlError::TooManyRedirects {
            url: "http://example.com/loop".into(),
            times: 11,
        };
        assert_eq!(
            err.to_string(),
            "redirected too many times (11) while fetching http://example.com/loop"
        );
    }
}
