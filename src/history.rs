//! Redirect history of one logical request.

use crate::request::Request;
use crate::response::Response;
use std::sync::Arc;

/// One followed redirect: the request that was sent and the redirect
/// response it received.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub request: Arc<Request>,
    pub response: Arc<Response>,
}

/// Ordered, append-only list of redirect hops.
///
/// Appending produces a new `History` and leaves the original untouched, so
/// a history captured by a response never changes afterwards.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Arc<Vec<HistoryEntry>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new history holding every existing hop followed by this one.
    pub fn append(&self, request: Arc<Request>, response: Arc<Response>) -> History {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.extend(self.entries.iter().cloned());
        entries.push(HistoryEntry { request, response });
        History {
            entries: Arc::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
