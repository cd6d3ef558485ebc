//! Module for tracking the activity of the crawl engine.
//!
//! `EngineState` counts requests and items that are queued or being worked
//! on. The engine is idle when all four counters are zero. Work moving from
//! a queue to a worker is counted as active before it stops being counted as
//! queued, so the engine never looks idle in between.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared activity counters of one engine.
#[derive(Debug, Default)]
pub struct EngineState {
    queued_requests: AtomicUsize,
    in_flight_requests: AtomicUsize,
    queued_items: AtomicUsize,
    processing_items: AtomicUsize,
}

#[derive(Debug, Clone, Copy)]
enum Activity {
    Request,
    Item,
}

/// Marks one request or item as being worked on until dropped.
#[derive(Debug)]
pub(crate) struct ActivityGuard {
    state: Arc<EngineState>,
    activity: Activity,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let counter = match self.activity {
            Activity::Request => &self.state.in_flight_requests,
            Activity::Item => &self.state.processing_items,
        };
        counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EngineState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queued_requests(&self) -> usize {
        self.queued_requests.load(Ordering::SeqCst)
    }

    pub fn in_flight_requests(&self) -> usize {
        self.in_flight_requests.load(Ordering::SeqCst)
    }

    pub fn queued_items(&self) -> usize {
        self.queued_items.load(Ordering::SeqCst)
    }

    pub fn processing_items(&self) -> usize {
        self.processing_items.load(Ordering::SeqCst)
    }

    /// True when nothing is queued or in progress.
    pub fn is_idle(&self) -> bool {
        self.in_flight_requests() == 0
            && self.queued_requests() == 0
            && self.processing_items() == 0
            && self.queued_items() == 0
    }

    pub(crate) fn request_queued(&self) {
        self.queued_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn request_unqueued(&self) {
        self.queued_requests.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn item_queued(&self) {
        self.queued_items.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn item_unqueued(&self) {
        self.queued_items.fetch_sub(1, Ordering::SeqCst);
    }

    /// Forgets every queued request, returning how many there were. Only
    /// valid once the request queue is closed and no longer drained.
    pub(crate) fn discard_queued_requests(&self) -> usize {
        self.queued_requests.swap(0, Ordering::SeqCst)
    }

    /// Item counterpart of [`EngineState::discard_queued_requests`].
    pub(crate) fn discard_queued_items(&self) -> usize {
        self.queued_items.swap(0, Ordering::SeqCst)
    }

    /// Moves one request from queued to in flight.
    pub(crate) fn begin_request(self: &Arc<Self>) -> ActivityGuard {
        self.in_flight_requests.fetch_add(1, Ordering::SeqCst);
        self.request_unqueued();
        ActivityGuard {
            state: Arc::clone(self),
            activity: Activity::Request,
        }
    }

    /// Moves one item from queued to processing.
    pub(crate) fn begin_item(self: &Arc<Self>) -> ActivityGuard {
        self.processing_items.fetch_add(1, Ordering::SeqCst);
        self.item_unqueued();
        ActivityGuard {
            state: Arc::clone(self),
            activity: Activity::Item,
        }
    }
}
