//! # Crawler Module
//!
//! Implements the crawl engine and the `Crawler` that drives it.
//!
//! ## Architecture
//!
//! Two unbounded queues feed two dispatch loops running as Tokio tasks:
//!
//! - **Request dispatcher**: admits requests under a concurrency limit (or
//!   one by one with a fixed delay) and runs each in its own worker, which
//!   performs one exchange and then retries, redirects, reports an error or
//!   calls the response callbacks.
//! - **Item dispatcher**: a fixed pool of workers running each item through
//!   the item functions and the pipelines.
//!
//! Retries and redirects go back through the request queue, so they
//! interleave fairly with the rest of the crawl.

mod core;
mod engine;
mod item_processor;
mod request_handler;

pub use core::Crawler;
pub use engine::CrawlEngine;
pub(crate) use engine::{EngineShared, Hooks};
