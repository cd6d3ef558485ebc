//! # Builder Module
//!
//! Provides the `CrawlerBuilder`, a fluent API for assembling a [`Crawler`]:
//! settings, transport, crawler-level callbacks, item functions, pipelines
//! and seed requests.
//!
//! ## Example
//!
//! ```rust,no_run
//! use crawlkit::prelude::*;
//!
//! #[derive(Debug)]
//! struct Title(String);
//!
//! # async fn run() -> Result<(), CrawlError> {
//! let crawler = CrawlerBuilder::new()
//!     .settings(Settings {
//!         max_concurrent_requests: 8,
//!         ..Settings::default()
//!     })
//!     .on_response(|response, ctx| {
//!         if let Ok(titles) = response.css("h1") {
//!             for title in titles.texts() {
//!                 ctx.add_item(Title(title));
//!             }
//!         }
//!     })
//!     .on_item_type::<Title, _>(|title, _ctx| {
//!         println!("{}", title.0);
//!         None
//!     })
//!     .start_url("https://example.com/")
//!     .build()?;
//!
//! crawler.run().await
//! # }
//! ```

use crate::context::Context;
use crate::crawler::{CrawlEngine, Crawler, Hooks};
use crate::error::{CrawlError, PipelineError};
use crate::item::Item;
use crate::pipeline::{FnPipeline, Pipeline};
use crate::request::Request;
use crate::response::Response;
use crate::settings::Settings;
use crate::transport::{ReqwestTransport, Transport};
use std::any::{Any, TypeId};
use std::sync::Arc;

pub struct CrawlerBuilder {
    settings: Settings,
    transport: Option<Arc<dyn Transport>>,
    hooks: Hooks,
    start_requests: Vec<Request>,
}

impl Default for CrawlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlerBuilder {
    pub fn new() -> Self {
        CrawlerBuilder {
            settings: Settings::default(),
            transport: None,
            hooks: Hooks::default(),
            start_requests: Vec::new(),
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the default `reqwest` transport.
    pub fn transport<T: Transport>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Crawler-level response callback, run after the request-level one.
    pub fn on_response<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Response, &Context) + Send + Sync + 'static,
    {
        self.hooks.on_response = Some(Arc::new(callback));
        self
    }

    /// Crawler-level error callback, run after the request-level one.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Request, &CrawlError, &Context) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(callback));
        self
    }

    /// Decides what happens with each followed redirect. The returned
    /// request, if any, is queued; `None` queues nothing.
    pub fn on_redirect<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Response, Request, &Context) -> Option<Request> + Send + Sync + 'static,
    {
        self.hooks.on_redirect = Some(Arc::new(callback));
        self
    }

    /// Item function applied to every item, after any type-specific one.
    /// Returning `None` drops the item.
    pub fn on_item<F>(mut self, f: F) -> Self
    where
        F: Fn(Item, &Context) -> Option<Item> + Send + Sync + 'static,
    {
        self.hooks.catch_all = Some(Arc::new(f));
        self
    }

    /// Item function for items of type `T`. Returning `None` drops the item.
    pub fn on_item_type<T, F>(mut self, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(T, &Context) -> Option<Item> + Send + Sync + 'static,
    {
        let erased = move |item: Item, ctx: &Context| match item.downcast::<T>() {
            Ok(value) => f(value, ctx),
            Err(item) => Some(item),
        };
        self.hooks.item_fns.insert(TypeId::of::<T>(), Arc::new(erased));
        self
    }

    pub fn add_pipeline<P: Pipeline>(mut self, pipeline: P) -> Self {
        self.hooks.pipelines.push(Arc::new(pipeline));
        self
    }

    pub fn add_pipeline_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Item, &Context) -> Result<Option<Item>, PipelineError> + Send + Sync + 'static,
    {
        self.add_pipeline(FnPipeline::new(name, f))
    }

    pub fn start_url(mut self, url: impl Into<String>) -> Self {
        self.start_requests.push(Request::get(url));
        self
    }

    pub fn start_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_requests.extend(Request::get_urls(urls));
        self
    }

    pub fn start_requests<I: IntoIterator<Item = Request>>(mut self, requests: I) -> Self {
        self.start_requests.extend(requests);
        self
    }

    /// Validates the settings and assembles the crawler. Nothing runs until
    /// [`Crawler::start`] or [`Crawler::run`].
    pub fn build(self) -> Result<Crawler, CrawlError> {
        self.settings.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.settings)?),
        };
        let engine = CrawlEngine::new(self.settings, self.hooks, transport);
        Ok(Crawler::new(engine, self.start_requests))
    }
}
