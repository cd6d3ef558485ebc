//! Item pipelines.
//!
//! Pipelines run in registration order after the crawler's item functions.
//! A pipeline returning `Ok(Some(item))` replaces the item for the rest of
//! the chain, while `Ok(None)` leaves it unchanged. This differs from item
//! functions, where `None` drops the item. An `Err` stops the chain for that
//! item only.

use crate::context::Context;
use crate::error::PipelineError;
use crate::item::Item;
use async_trait::async_trait;

#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Processes one item. `Ok(None)` passes the item on unchanged.
    async fn process_item(&self, item: &Item, ctx: &Context)
        -> Result<Option<Item>, PipelineError>;

    /// Called once when the crawler closes.
    async fn close(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// A [`Pipeline`] built from a synchronous closure.
pub struct FnPipeline<F> {
    name: String,
    f: F,
}

impl<F> FnPipeline<F>
where
    F: Fn(&Item, &Context) -> Result<Option<Item>, PipelineError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        FnPipeline {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Pipeline for FnPipeline<F>
where
    F: Fn(&Item, &Context) -> Result<Option<Item>, PipelineError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_item(
        &self,
        item: &Item,
        ctx: &Context,
    ) -> Result<Option<Item>, PipelineError> {
        (self.f)(item, ctx)
    }
}
