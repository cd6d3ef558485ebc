//! A "prelude" for users of the `crawlkit` crate.
//!
//! Re-exports the types most crawls need.
//!
//! # Example
//!
//! ```
//! use crawlkit::prelude::*;
//! ```

pub use crate::{
    async_trait,
    html::{Document, Scope, Selector, Selectors},
    url_join, Context, CrawlError, Crawler, CrawlerBuilder, Emit, Item, Pipeline, PipelineError,
    QueryError, Request, Response, Settings, Transport,
};
