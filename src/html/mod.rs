//! Document queries: HTML parsing, CSS-to-XPath compilation, XPath evaluation
//! and the compiled query cache.

pub mod cache;
pub mod css;
pub mod dom;
pub mod selector;
pub mod xpath;

pub use cache::QueryCache;
pub use css::{css_to_xpath, Scope};
pub use dom::{DomTree, NodeData, NodeId};
pub use selector::{Document, Selector, Selectors};
pub use xpath::{CompiledQuery, Value, XNode};
