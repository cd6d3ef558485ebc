//! Crawl settings.
//!
//! `Settings` carries every knob the engine consults at runtime: admission
//! limits, retry and redirect bounds, timeouts, and the document query cache
//! size. It deserializes from any `serde` format with missing fields falling
//! back to their defaults; durations are expressed in milliseconds.

use crate::error::CrawlError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration for a crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum number of requests in flight at once.
    pub max_concurrent_requests: usize,
    /// Fixed delay between requests. A non-zero delay switches the engine
    /// into sequential mode.
    #[serde(with = "duration_ms")]
    pub request_delay: Duration,
    /// Default timeout for one HTTP exchange.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// Number of workers draining the item queue.
    pub item_workers: usize,
    /// Maximum number of items processed at once.
    pub max_concurrent_process_items: usize,
    /// How many times a request is retried after a transport failure.
    pub max_retry_times: u32,
    /// How many redirect hops are followed for one logical request.
    pub max_redirect_times: u32,
    /// Parse HTML bodies eagerly when a response is built.
    pub auto_parse_html: bool,
    /// Accept invalid TLS certificates.
    pub skip_tls_verify: bool,
    /// Capacity of the compiled query cache. Zero disables caching.
    pub selector_cache_capacity: usize,
    /// Bypass the compiled query cache regardless of capacity.
    pub disable_selector_cache: bool,
    /// Interval at which `wait` polls the engine for idleness.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Default `User-Agent` header applied when a request has none.
    pub user_agent: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_concurrent_requests: 100,
            request_delay: Duration::ZERO,
            request_timeout: Duration::from_millis(20_000),
            item_workers: 6,
            max_concurrent_process_items: 6,
            max_retry_times: 3,
            max_redirect_times: 10,
            auto_parse_html: true,
            skip_tls_verify: false,
            selector_cache_capacity: 100,
            disable_selector_cache: false,
            poll_interval: Duration::from_millis(200),
            user_agent: None,
        }
    }
}

impl Settings {
    /// Checks that the settings describe a runnable engine.
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.max_concurrent_requests == 0 {
            return Err(CrawlError::Configuration(
                "max_concurrent_requests must be greater than 0.".to_string(),
            ));
        }
        if self.item_workers == 0 {
            return Err(CrawlError::Configuration(
                "item_workers must be greater than 0.".to_string(),
            ));
        }
        if self.max_concurrent_process_items == 0 {
            return Err(CrawlError::Configuration(
                "max_concurrent_process_items must be greater than 0.".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(CrawlError::Configuration(
                "poll_interval must be greater than 0.".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true if the compiled query cache should be used.
    pub fn selector_cache_enabled(&self) -> bool {
        !self.disable_selector_cache && self.selector_cache_capacity > 0
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"max_concurrent_requests": 4, "request_delay": 250}"#)
                .unwrap();
        assert_eq!(settings.max_concurrent_requests, 4);
        assert_eq!(settings.request_delay, Duration::from_millis(250));
        assert_eq!(settings.request_timeout, Duration::from_secs(20));
        assert_eq!(settings.max_retry_times, 3);
        assert_eq!(settings.item_workers, 6);
    }

    #[test]
    fn durations_serialize_as_milliseconds() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["request_timeout"], 20_000);
        assert_eq!(json["poll_interval"], 200);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let settings = Settings {
            max_concurrent_requests: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CrawlError::Configuration(_))
        ));
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn cache_is_disabled_by_flag_or_zero_capacity() {
        let mut settings = Settings::default();
        assert!(settings.selector_cache_enabled());
        settings.selector_cache_capacity = 0;
        assert!(!settings.selector_cache_enabled());
        settings.selector_cache_capacity = 10;
        settings.disable_selector_cache = true;
        assert!(!settings.selector_cache_enabled());
    }
}
