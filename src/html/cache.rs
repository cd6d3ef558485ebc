//! Bounded LRU cache of compiled queries.

use super::css::{css_to_xpath, Scope};
use super::xpath::CompiledQuery;
use crate::error::QueryError;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum QueryKey {
    XPath(String),
    Css(String, Scope),
}

/// Caches compiled XPath and CSS queries, keyed by their source text.
///
/// Compilation happens outside the lock; when two callers race on the same
/// key the entry inserted first wins and both receive it. A cache built with
/// [`QueryCache::disabled`] recompiles on every call.
pub struct QueryCache {
    entries: Option<Mutex<LruCache<QueryKey, Arc<CompiledQuery>>>>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("enabled", &self.is_enabled())
            .field("len", &self.len())
            .finish()
    }
}

impl QueryCache {
    /// A cache holding at most `capacity` queries. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        QueryCache {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn disabled() -> Self {
        QueryCache { entries: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compiles an XPath expression, reusing a cached compilation when present.
    pub fn xpath(&self, expr: &str) -> Result<Arc<CompiledQuery>, QueryError> {
        self.get_or_compile(QueryKey::XPath(expr.to_string()), || {
            CompiledQuery::compile(expr)
        })
    }

    /// Translates a CSS selector in `scope` and compiles the resulting XPath.
    pub fn css(&self, selector: &str, scope: Scope) -> Result<Arc<CompiledQuery>, QueryError> {
        self.get_or_compile(QueryKey::Css(selector.to_string(), scope), || {
            CompiledQuery::compile(&css_to_xpath(selector, scope)?)
        })
    }

    fn get_or_compile<F>(&self, key: QueryKey, compile: F) -> Result<Arc<CompiledQuery>, QueryError>
    where
        F: FnOnce() -> Result<CompiledQuery, QueryError>,
    {
        let Some(entries) = &self.entries else {
            return compile().map(Arc::new);
        };

        if let Some(hit) = entries.lock().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let compiled = Arc::new(compile()?);
        let mut entries = entries.lock();
        if let Some(raced) = entries.get(&key) {
            return Ok(Arc::clone(raced));
        }
        entries.put(key, Arc::clone(&compiled));
        Ok(compiled)
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        QueryCache::new(100)
    }
}
