//! Crawl lineage.
//!
//! Every submitted request owns a `Context` describing where it came from:
//! how many hops away from a seed it is and which exchange emitted it.
//! Emitting a request snapshots the emitting context, so siblings created from
//! the same parent never observe each other's depth or referer.

use crate::crawler::EngineShared;
use crate::item::{Item, ItemEnvelope};
use crate::request::Request;
use crate::response::Response;
use crate::settings::Settings;
use crate::stats::StatCollector;
use log::warn;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Something a callback hands back to the engine.
#[derive(Debug)]
pub enum Emit {
    Request(Request),
    Item(Item),
}

impl From<Request> for Emit {
    fn from(request: Request) -> Self {
        Emit::Request(request)
    }
}

impl From<Item> for Emit {
    fn from(item: Item) -> Self {
        Emit::Item(item)
    }
}

/// Lineage of one request: depth from the seed and the last exchange.
#[derive(Clone)]
pub struct Context {
    engine: Arc<EngineShared>,
    depth: u32,
    last_request: Option<Arc<Request>>,
    last_response: Option<Arc<Response>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.depth)
            .field("last_request", &self.last_request.as_ref().map(|r| &r.url))
            .field("last_response", &self.last_response.as_ref().map(|r| r.url()))
            .finish()
    }
}

impl Context {
    /// The lineage root. Requests emitted from it are seeds at depth 1.
    pub(crate) fn root(engine: Arc<EngineShared>) -> Self {
        Context {
            engine,
            depth: 0,
            last_request: None,
            last_response: None,
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// The request whose response this context last observed.
    pub fn last_request(&self) -> Option<&Arc<Request>> {
        self.last_request.as_ref()
    }

    pub fn last_response(&self) -> Option<&Arc<Response>> {
        self.last_response.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.engine.settings
    }

    pub fn stats(&self) -> &Arc<StatCollector> {
        &self.engine.stats
    }

    pub(crate) fn observe(&mut self, request: Arc<Request>, response: Arc<Response>) {
        self.last_request = Some(request);
        self.last_response = Some(response);
    }

    /// Submits a request or an item.
    pub fn emit(&self, value: impl Into<Emit>) {
        match value.into() {
            Emit::Request(request) => self.add_request(request),
            Emit::Item(item) => self.add_item(item),
        }
    }

    /// Submits `request` one hop deeper than this context.
    ///
    /// When this context has seen a response and the request carries no
    /// `Referer`, the response URL becomes its referer.
    pub fn add_request(&self, mut request: Request) {
        let mut child = self.clone();
        child.depth += 1;
        if let Some(last) = &child.last_response {
            if !request.headers.contains("Referer") {
                request.headers.set("Referer", last.url());
            }
        }
        request.context = Some(child);
        self.submit(request);
    }

    /// Queues `value` for item processing, tagged with this context.
    pub fn add_item<T: Any + Send + Sync>(&self, value: T) {
        let envelope = ItemEnvelope {
            item: Item::new(value),
            context: self.clone(),
        };
        if let Err(e) = self.engine.enqueue_item(envelope) {
            warn!("Dropping item emitted at depth {}: {}", self.depth, e);
        }
    }

    /// Resubmits `request` within its existing lineage.
    pub fn retry(&self, mut request: Request) {
        request.context.get_or_insert_with(|| self.clone());
        self.submit(request);
    }

    fn submit(&self, request: Request) {
        let url = request.url.clone();
        if let Err(e) = self.engine.enqueue_request(request) {
            warn!("Dropping request to {}: {}", url, e);
        }
    }
}
