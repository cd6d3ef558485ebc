//! The crawl engine: request and item queues plus their dispatch loops.

use super::item_processor::spawn_item_dispatcher;
use super::request_handler::spawn_request_dispatcher;
use crate::context::Context;
use crate::error::CrawlError;
use crate::html::QueryCache;
use crate::item::{Item, ItemEnvelope, ItemFn};
use crate::pipeline::Pipeline;
use crate::request::{ErrorCallback, RedirectCallback, Request, ResponseCallback};
use crate::settings::Settings;
use crate::state::EngineState;
use crate::stats::StatCollector;
use crate::transport::Transport;
use kanal::{AsyncReceiver, AsyncSender};
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Crawler-level callbacks, item functions and pipelines. Fixed once the
/// engine is built.
#[derive(Default)]
pub(crate) struct Hooks {
    pub on_response: Option<ResponseCallback>,
    pub on_error: Option<ErrorCallback>,
    pub on_redirect: Option<RedirectCallback>,
    pub item_fns: HashMap<TypeId, ItemFn>,
    pub catch_all: Option<ItemFn>,
    pub pipelines: Vec<Arc<dyn Pipeline>>,
}

/// Everything a worker or a context needs to reach the engine.
pub(crate) struct EngineShared {
    pub settings: Arc<Settings>,
    pub hooks: Hooks,
    pub transport: Arc<dyn Transport>,
    pub state: Arc<EngineState>,
    pub stats: Arc<StatCollector>,
    pub cache: Arc<QueryCache>,
    req_tx: AsyncSender<Request>,
    item_tx: AsyncSender<ItemEnvelope>,
}

impl EngineShared {
    pub(crate) fn enqueue_request(&self, request: Request) -> Result<(), CrawlError> {
        self.state.request_queued();
        match self.req_tx.try_send(request) {
            Ok(true) => {
                self.stats.increment_requests_enqueued();
                Ok(())
            }
            _ => {
                self.state.request_unqueued();
                self.stats.increment_requests_dropped();
                Err(CrawlError::QueueClosed)
            }
        }
    }

    pub(crate) fn enqueue_item(&self, envelope: ItemEnvelope) -> Result<(), CrawlError> {
        self.state.item_queued();
        match self.item_tx.try_send(envelope) {
            Ok(true) => {
                self.stats.increment_items_scraped();
                Ok(())
            }
            _ => {
                self.state.item_unqueued();
                self.stats.increment_items_dropped();
                Err(CrawlError::QueueClosed)
            }
        }
    }

    /// Runs the error callback chain: request-level first, then crawler-level.
    pub(crate) fn report_error(&self, request: &Request, err: &CrawlError, ctx: &Context) {
        let mut handled = false;
        if let Some(callback) = &request.error_callback {
            callback(request, err, ctx);
            handled = true;
        }
        if let Some(callback) = &self.hooks.on_error {
            callback(request, err, ctx);
            handled = true;
        }
        if !handled {
            error!("Request {} {} failed: {}", request.method, request.url, err);
        }
    }
}

/// Owns the request and item queues and drives them with bounded workers.
///
/// Requests and items may be submitted before [`CrawlEngine::start`]; they
/// wait in their queues until the dispatch loops run.
pub struct CrawlEngine {
    shared: Arc<EngineShared>,
    receivers: Mutex<Option<(AsyncReceiver<Request>, AsyncReceiver<ItemEnvelope>)>>,
    started: AtomicBool,
    request_loop: Mutex<Option<JoinHandle<()>>>,
    item_loop: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for CrawlEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlEngine")
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("state", &self.shared.state)
            .finish_non_exhaustive()
    }
}

impl Drop for CrawlEngine {
    // The dispatch loops only exit once their queue is closed, and they keep
    // the shared engine alive until then.
    fn drop(&mut self) {
        let _ = self.shared.req_tx.close();
        let _ = self.shared.item_tx.close();
    }
}

impl CrawlEngine {
    pub(crate) fn new(settings: Settings, hooks: Hooks, transport: Arc<dyn Transport>) -> Self {
        let (req_tx, req_rx) = kanal::unbounded_async();
        let (item_tx, item_rx) = kanal::unbounded_async();
        let cache = if settings.selector_cache_enabled() {
            QueryCache::new(settings.selector_cache_capacity)
        } else {
            QueryCache::disabled()
        };
        let shared = Arc::new(EngineShared {
            settings: Arc::new(settings),
            hooks,
            transport,
            state: EngineState::new(),
            stats: Arc::new(StatCollector::new()),
            cache: Arc::new(cache),
            req_tx,
            item_tx,
        });
        CrawlEngine {
            shared,
            receivers: Mutex::new(Some((req_rx, item_rx))),
            started: AtomicBool::new(false),
            request_loop: Mutex::new(None),
            item_loop: Mutex::new(None),
        }
    }

    /// Spawns the request and item dispatch loops on the current tokio runtime.
    pub fn start(&self) -> Result<(), CrawlError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CrawlError::AlreadyStarted);
        }
        let Some((req_rx, item_rx)) = self.receivers.lock().take() else {
            return Err(CrawlError::AlreadyStarted);
        };
        *self.request_loop.lock() = Some(spawn_request_dispatcher(
            Arc::clone(&self.shared),
            req_rx,
        ));
        *self.item_loop.lock() = Some(spawn_item_dispatcher(Arc::clone(&self.shared), item_rx));
        debug!("Crawl engine started");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Queues `request` as-is, without creating a new lineage hop.
    pub fn submit_request(&self, request: Request) -> Result<(), CrawlError> {
        self.shared.enqueue_request(request)
    }

    /// Queues `item` for processing under `ctx`.
    pub fn submit_item(&self, item: Item, ctx: &Context) -> Result<(), CrawlError> {
        self.shared.enqueue_item(ItemEnvelope {
            item,
            context: ctx.clone(),
        })
    }

    /// The root of the lineage tree.
    pub fn context(&self) -> Context {
        Context::root(Arc::clone(&self.shared))
    }

    /// True iff no request or item is queued or being processed.
    pub fn is_idle(&self) -> bool {
        self.shared.state.is_idle()
    }

    /// Polls until the engine is idle.
    pub async fn wait(&self) {
        let interval = self.shared.settings.poll_interval;
        while !self.is_idle() {
            tokio::time::sleep(interval).await;
        }
    }

    /// Like [`CrawlEngine::wait`], giving up after `timeout`. Returns whether
    /// the engine became idle.
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    /// Closes the request queue, waits for in-flight requests, then does the
    /// same for the item queue. Work still queued at that point is discarded
    /// and counted as dropped. Later submissions fail with
    /// [`CrawlError::QueueClosed`].
    pub async fn shutdown(&self) {
        self.receivers.lock().take();

        let _ = self.shared.req_tx.close();
        let request_loop = self.request_loop.lock().take();
        if let Some(task) = request_loop {
            if let Err(e) = task.await {
                error!("The request dispatch loop failed: {:?}", e);
            }
        }
        let requests = self.shared.state.discard_queued_requests();

        let _ = self.shared.item_tx.close();
        let item_loop = self.item_loop.lock().take();
        if let Some(task) = item_loop {
            if let Err(e) = task.await {
                error!("The item dispatch loop failed: {:?}", e);
            }
        }
        let items = self.shared.state.discard_queued_items();

        if requests > 0 || items > 0 {
            warn!(
                "Discarded {} queued requests and {} queued items at shutdown",
                requests, items
            );
            self.shared.stats.record_discarded(requests, items);
        }
        debug!("Crawl engine shut down");
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    pub fn stats(&self) -> &Arc<StatCollector> {
        &self.shared.stats
    }

    pub fn state(&self) -> &Arc<EngineState> {
        &self.shared.state
    }

    pub fn query_cache(&self) -> &Arc<QueryCache> {
        &self.shared.cache
    }

    pub(crate) fn pipelines(&self) -> &[Arc<dyn Pipeline>] {
        &self.shared.hooks.pipelines
    }

    #[cfg(test)]
    pub(crate) fn drain_requests(&self) -> Vec<Request> {
        let mut drained = Vec::new();
        if let Some((req_rx, _)) = self.receivers.lock().as_ref() {
            while let Ok(Some(request)) = req_rx.try_recv() {
                self.shared.state.request_unqueued();
                drained.push(request);
            }
        }
        drained
    }
}
