//! # Statistics Module
//!
//! Counters describing what a crawl has done so far.
//!
//! `StatCollector` is shared by the engine's workers and updated with atomic
//! operations. [`StatCollector::snapshot`] captures a consistent-enough copy
//! for reporting; the snapshot is what gets rendered as text, Markdown or
//! JSON.
//!
//! ## Example
//!
//! ```rust,ignore
//! let crawler = CrawlerBuilder::new().start_url("https://example.com/").build()?;
//! crawler.run().await?;
//! println!("{}", crawler.stats());
//! println!("{}", crawler.stats().to_json_string_pretty()?);
//! ```

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub requests_enqueued: usize,
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub requests_retried: usize,
    pub requests_redirected: usize,
    pub requests_dropped: usize,
    pub responses_received: usize,
    pub total_bytes_downloaded: usize,
    pub items_scraped: usize,
    pub items_processed: usize,
    pub items_dropped: usize,
    pub response_status_counts: BTreeMap<u16, usize>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

impl StatsSnapshot {
    fn per_second(&self, count: usize) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            count as f64 / seconds
        } else {
            0.0
        }
    }

    fn formatted_bytes(&self) -> String {
        const KB: usize = 1024;
        const MB: usize = 1024 * KB;
        const GB: usize = 1024 * MB;

        let bytes = self.total_bytes_downloaded;
        if bytes >= GB {
            format!("{:.2} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2} KB", bytes as f64 / KB as f64)
        } else {
            format!("{} B", bytes)
        }
    }

    fn status_list(&self, separator: &str, render: impl Fn(u16, usize) -> String) -> Option<String> {
        if self.response_status_counts.is_empty() {
            return None;
        }
        Some(
            self.response_status_counts
                .iter()
                .map(|(&code, &count)| render(code, count))
                .collect::<Vec<_>>()
                .join(separator),
        )
    }
}

/// Collects statistics about a running crawl.
#[derive(Debug)]
pub struct StatCollector {
    start_time: Instant,

    requests_enqueued: AtomicUsize,
    requests_sent: AtomicUsize,
    requests_succeeded: AtomicUsize,
    requests_failed: AtomicUsize,
    requests_retried: AtomicUsize,
    requests_redirected: AtomicUsize,
    requests_dropped: AtomicUsize,

    responses_received: AtomicUsize,
    response_status_counts: DashMap<u16, usize>,
    total_bytes_downloaded: AtomicUsize,

    items_scraped: AtomicUsize,
    items_processed: AtomicUsize,
    items_dropped: AtomicUsize,
}

macro_rules! counters {
    ($($field:ident => $increment:ident),* $(,)?) => {
        $(
            pub fn $field(&self) -> usize {
                self.$field.load(Ordering::SeqCst)
            }

            pub(crate) fn $increment(&self) {
                self.$field.fetch_add(1, Ordering::SeqCst);
            }
        )*
    };
}

impl StatCollector {
    pub fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            requests_enqueued: AtomicUsize::new(0),
            requests_sent: AtomicUsize::new(0),
            requests_succeeded: AtomicUsize::new(0),
            requests_failed: AtomicUsize::new(0),
            requests_retried: AtomicUsize::new(0),
            requests_redirected: AtomicUsize::new(0),
            requests_dropped: AtomicUsize::new(0),
            responses_received: AtomicUsize::new(0),
            response_status_counts: DashMap::new(),
            total_bytes_downloaded: AtomicUsize::new(0),
            items_scraped: AtomicUsize::new(0),
            items_processed: AtomicUsize::new(0),
            items_dropped: AtomicUsize::new(0),
        }
    }

    counters! {
        requests_enqueued => increment_requests_enqueued,
        requests_sent => increment_requests_sent,
        requests_succeeded => increment_requests_succeeded,
        requests_failed => increment_requests_failed,
        requests_retried => increment_requests_retried,
        requests_redirected => increment_requests_redirected,
        requests_dropped => increment_requests_dropped,
        responses_received => increment_responses_received,
        items_scraped => increment_items_scraped,
        items_processed => increment_items_processed,
        items_dropped => increment_items_dropped,
    }

    pub fn total_bytes_downloaded(&self) -> usize {
        self.total_bytes_downloaded.load(Ordering::SeqCst)
    }

    /// How many responses arrived with `status`.
    pub fn status_count(&self, status: u16) -> usize {
        self.response_status_counts
            .get(&status)
            .map_or(0, |count| *count)
    }

    pub(crate) fn record_response(&self, status: u16, bytes: usize) {
        self.increment_responses_received();
        *self.response_status_counts.entry(status).or_insert(0) += 1;
        self.total_bytes_downloaded
            .fetch_add(bytes, Ordering::SeqCst);
    }

    /// Counts work that was still queued when the engine shut down.
    pub(crate) fn record_discarded(&self, requests: usize, items: usize) {
        self.requests_dropped.fetch_add(requests, Ordering::SeqCst);
        self.items_dropped.fetch_add(items, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_enqueued: self.requests_enqueued(),
            requests_sent: self.requests_sent(),
            requests_succeeded: self.requests_succeeded(),
            requests_failed: self.requests_failed(),
            requests_retried: self.requests_retried(),
            requests_redirected: self.requests_redirected(),
            requests_dropped: self.requests_dropped(),
            responses_received: self.responses_received(),
            total_bytes_downloaded: self.total_bytes_downloaded(),
            items_scraped: self.items_scraped(),
            items_processed: self.items_processed(),
            items_dropped: self.items_dropped(),
            response_status_counts: self
                .response_status_counts
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
            elapsed: self.start_time.elapsed(),
        }
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot())
    }

    pub fn to_json_string_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    /// Renders the current statistics as a Markdown report.
    pub fn to_markdown_string(&self) -> String {
        let s = self.snapshot();
        let status_codes = s
            .status_list("\n", |code, count| format!("- **{}**: {}", code, count))
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            r#"# Crawl Statistics Report

- **Duration**: {:?}
- **Average Speed**: {:.2} req/s, {:.2} resp/s, {:.2} item/s

## Requests
| Metric     | Count |
|------------|-------|
| Enqueued   | {} |
| Sent       | {} |
| Succeeded  | {} |
| Failed     | {} |
| Retried    | {} |
| Redirected | {} |
| Dropped    | {} |

## Responses
| Metric     | Count |
|------------|-------|
| Received   | {} |
| Downloaded | {} |

## Items
| Metric     | Count |
|------------|-------|
| Scraped    | {} |
| Processed  | {} |
| Dropped    | {} |

## Status Codes
{}
"#,
            s.elapsed,
            s.per_second(s.requests_sent),
            s.per_second(s.responses_received),
            s.per_second(s.items_scraped),
            s.requests_enqueued,
            s.requests_sent,
            s.requests_succeeded,
            s.requests_failed,
            s.requests_retried,
            s.requests_redirected,
            s.requests_dropped,
            s.responses_received,
            s.formatted_bytes(),
            s.items_scraped,
            s.items_processed,
            s.items_dropped,
            status_codes
        )
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StatCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot();

        writeln!(f, "\nCrawl Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(f, "  duration : {:?}", s.elapsed)?;
        writeln!(
            f,
            "  speed    : req/s: {:.2}, resp/s: {:.2}, item/s: {:.2}",
            s.per_second(s.requests_sent),
            s.per_second(s.responses_received),
            s.per_second(s.items_scraped)
        )?;
        writeln!(
            f,
            "  requests : enqueued: {}, sent: {}, ok: {}, fail: {}, retry: {}, redirect: {}, drop: {}",
            s.requests_enqueued,
            s.requests_sent,
            s.requests_succeeded,
            s.requests_failed,
            s.requests_retried,
            s.requests_redirected,
            s.requests_dropped
        )?;
        writeln!(
            f,
            "  response : received: {}, downloaded: {}",
            s.responses_received,
            s.formatted_bytes()
        )?;
        writeln!(
            f,
            "  items    : scraped: {}, processed: {}, dropped: {}",
            s.items_scraped, s.items_processed, s.items_dropped
        )?;
        let status = s
            .status_list(", ", |code, count| format!("{}: {}", code, count))
            .unwrap_or_else(|| "none".to_string());
        writeln!(f, "  status   : {}\n", status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = StatCollector::new();
        stats.increment_requests_sent();
        stats.increment_requests_sent();
        stats.record_response(200, 1500);
        stats.record_response(404, 10);
        stats.record_response(200, 500);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests_sent, 2);
        assert_eq!(snapshot.responses_received, 3);
        assert_eq!(snapshot.total_bytes_downloaded, 2010);
        assert_eq!(snapshot.response_status_counts.get(&200), Some(&2));
        assert_eq!(stats.status_count(404), 1);
        assert_eq!(snapshot.formatted_bytes(), "1.96 KB");
    }

    #[test]
    fn json_export_contains_counters() {
        let stats = StatCollector::new();
        stats.increment_items_scraped();
        stats.record_response(301, 0);
        let json: serde_json::Value = serde_json::from_str(&stats.to_json_string().unwrap()).unwrap();
        assert_eq!(json["items_scraped"], 1);
        assert_eq!(json["response_status_counts"]["301"], 1);
        assert!(json["elapsed_ms"].is_u64());
    }

    #[test]
    fn text_reports_list_status_codes() {
        let stats = StatCollector::new();
        assert!(stats.to_string().contains("status   : none"));
        stats.record_response(500, 0);
        assert!(stats.to_string().contains("500: 1"));
        assert!(stats.to_markdown_string().contains("- **500**: 1"));
    }
}
