//! # crawlkit
//!
//! A concurrent crawl engine with request lineage, retry and redirect
//! bookkeeping, item pipelines and CSS / XPath document queries.
//!
//! Requests enter the engine through a [`Context`], which records how deep
//! in the crawl a request sits and which response led to it. The engine
//! fetches each request under a concurrency limit, retries transport
//! failures and follows redirects through its queue, and hands responses to
//! callbacks. Items emitted by callbacks run through the registered item
//! functions and [`Pipeline`]s.
//!
//! ## Example
//!
//! ```rust,no_run
//! use crawlkit::prelude::*;
//!
//! # async fn run() -> Result<(), CrawlError> {
//! let crawler = CrawlerBuilder::new()
//!     .on_response(|response, ctx| {
//!         let Ok(links) = response.css("a[href]") else { return };
//!         for href in links.attrs("href") {
//!             if ctx.depth() < 3 {
//!                 if let Ok(url) = url_join(response.url(), &href) {
//!                     ctx.add_request(Request::get(url));
//!                 }
//!             }
//!         }
//!     })
//!     .start_url("https://example.com/")
//!     .build()?;
//! crawler.run().await?;
//! println!("{}", crawler.stats());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod context;
pub mod crawler;
pub mod error;
pub mod history;
pub mod html;
pub mod item;
pub mod pipeline;
pub mod prelude;
pub mod request;
pub mod response;
pub mod settings;
pub mod state;
pub mod stats;
pub mod transport;
pub mod utils;

pub use builder::CrawlerBuilder;
pub use context::{Context, Emit};
pub use crawler::{CrawlEngine, Crawler};
pub use error::{CrawlError, PipelineError, QueryError};
pub use history::{History, HistoryEntry};
pub use item::Item;
pub use pipeline::{FnPipeline, Pipeline};
pub use request::{Headers, Request};
pub use response::Response;
pub use settings::Settings;
pub use stats::StatCollector;
pub use transport::{ExchangeOptions, ReqwestTransport, Transport, WireRequest, WireResponse};
pub use utils::url_join;

pub use async_trait::async_trait;
pub use tokio;
