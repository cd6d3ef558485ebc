//! The `Crawler`: a built engine plus its seed requests.
//!
//! `Crawler::run` is the usual entry point. It starts the engine, emits the
//! seed requests through the root context, waits until the engine is idle and
//! closes the pipelines. The individual steps are public for callers that
//! want to feed the engine over time.

use super::engine::CrawlEngine;
use crate::context::Context;
use crate::error::CrawlError;
use crate::request::Request;
use crate::stats::StatCollector;
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct Crawler {
    engine: Arc<CrawlEngine>,
    start_requests: Mutex<Vec<Request>>,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("engine", &self.engine)
            .field("start_requests", &self.start_requests.lock().len())
            .finish()
    }
}

impl Crawler {
    pub(crate) fn new(engine: CrawlEngine, start_requests: Vec<Request>) -> Self {
        Crawler {
            engine: Arc::new(engine),
            start_requests: Mutex::new(start_requests),
        }
    }

    pub fn engine(&self) -> &Arc<CrawlEngine> {
        &self.engine
    }

    /// The root context. Requests emitted from it are seeds at depth 1.
    pub fn context(&self) -> Context {
        self.engine.context()
    }

    pub fn stats(&self) -> &Arc<StatCollector> {
        self.engine.stats()
    }

    /// Emits `request` as a seed.
    pub fn crawl(&self, request: Request) {
        self.context().add_request(request);
    }

    pub fn crawl_url(&self, url: impl Into<String>) {
        self.crawl(Request::get(url));
    }

    /// Starts the engine and emits the configured start requests.
    pub fn start(&self) -> Result<(), CrawlError> {
        let settings = self.engine.settings();
        info!(
            "Crawler starting with configuration: max_concurrent_requests={}, item_workers={}, max_concurrent_process_items={}, request_delay={:?}",
            settings.max_concurrent_requests,
            settings.item_workers,
            settings.max_concurrent_process_items,
            settings.request_delay
        );
        self.engine.start()?;

        let seeds = std::mem::take(&mut *self.start_requests.lock());
        info!("Emitting {} start requests", seeds.len());
        let root = self.context();
        for request in seeds {
            root.add_request(request);
        }
        Ok(())
    }

    pub async fn wait(&self) {
        self.engine.wait().await
    }

    /// Returns whether the crawl went idle before `timeout` elapsed.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        self.engine.wait_timeout(timeout).await
    }

    /// Starts, waits for the crawl to go idle and closes.
    pub async fn run(&self) -> Result<(), CrawlError> {
        self.start()?;
        self.wait().await;
        info!("Crawl went idle");
        self.close().await;
        Ok(())
    }

    /// Shuts the engine down and closes every pipeline.
    pub async fn close(&self) {
        self.engine.shutdown().await;

        info!("Closing item pipelines...");
        let pipelines = self.engine.pipelines();
        let closing_futures = pipelines.iter().map(|pipeline| pipeline.close());
        for (pipeline, result) in pipelines.iter().zip(join_all(closing_futures).await) {
            if let Err(e) = result {
                error!("Failed to close pipeline '{}': {}", pipeline.name(), e);
            }
        }

        info!("Crawl finished. {}", self.stats());
    }
}
