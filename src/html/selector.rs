//! Query handles over a parsed [`Document`].

use super::cache::QueryCache;
use super::css::Scope;
use super::dom::{DomTree, NodeData};
use super::xpath::{CompiledQuery, XNode};
use crate::error::QueryError;
use std::sync::Arc;

/// A parsed HTML document bound to the query cache used to compile selectors against it.
#[derive(Clone)]
pub struct Document {
    tree: Arc<DomTree>,
    cache: Arc<QueryCache>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.tree.len())
            .finish()
    }
}

impl Document {
    /// Parses `html` with a private, default-sized query cache.
    pub fn parse(html: &str) -> Self {
        Self::parse_with_cache(html, Arc::new(QueryCache::default()))
    }

    pub fn parse_with_cache(html: &str, cache: Arc<QueryCache>) -> Self {
        Document {
            tree: Arc::new(DomTree::parse(html)),
            cache,
        }
    }

    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// The document node. Queries issued from it run in global scope.
    pub fn root(&self) -> Selector<'_> {
        Selector {
            doc: self,
            node: XNode::Node(self.tree.root()),
        }
    }

    pub fn css(&self, selector: &str) -> Result<Selectors<'_>, QueryError> {
        self.root().css(selector)
    }

    pub fn xpath(&self, expr: &str) -> Result<Selectors<'_>, QueryError> {
        self.root().xpath(expr)
    }
}

/// One node of a [`Document`].
#[derive(Clone, Copy)]
pub struct Selector<'d> {
    doc: &'d Document,
    node: XNode,
}

impl std::fmt::Debug for Selector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Selector").field(&self.node).finish()
    }
}

impl<'d> Selector<'d> {
    pub fn node(&self) -> XNode {
        self.node
    }

    pub fn is_root(&self) -> bool {
        self.node == XNode::Node(self.doc.tree.root())
    }

    /// Selects descendants matching a CSS selector group.
    pub fn css(&self, selector: &str) -> Result<Selectors<'d>, QueryError> {
        let scope = if self.is_root() {
            Scope::Global
        } else {
            Scope::Local
        };
        let query = self.doc.cache.css(selector, scope)?;
        Ok(self.select(&query))
    }

    pub fn xpath(&self, expr: &str) -> Result<Selectors<'d>, QueryError> {
        let query = self.doc.cache.xpath(expr)?;
        Ok(self.select(&query))
    }

    fn select(&self, query: &CompiledQuery) -> Selectors<'d> {
        Selectors {
            doc: self.doc,
            nodes: query.select(&self.doc.tree, self.node),
        }
    }

    /// Text content of the node, excluding comments. Attributes yield their value.
    pub fn text(&self) -> String {
        let tree = &self.doc.tree;
        match self.node {
            XNode::Node(id) => match &tree.node(id).data {
                NodeData::Comment(_) => String::new(),
                _ => tree.text(id),
            },
            XNode::Attr(owner, index) => tree.attrs(owner)[index].1.clone(),
        }
    }

    /// Serialized HTML of the node including its own tags.
    pub fn html(&self) -> String {
        let tree = &self.doc.tree;
        match self.node {
            XNode::Node(id) => tree.outer_html(id),
            XNode::Attr(owner, index) => {
                let (name, value) = &tree.attrs(owner)[index];
                format!("{name}=\"{}\"", value.replace('"', "&quot;"))
            }
        }
    }

    /// Serialized HTML of the node's children.
    pub fn inner_html(&self) -> String {
        match self.node {
            XNode::Node(id) => self.doc.tree.inner_html(id),
            XNode::Attr(..) => self.text(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&'d str> {
        let tree: &'d DomTree = &self.doc.tree;
        match self.node {
            XNode::Node(id) => tree.attr(id, name),
            XNode::Attr(..) => None,
        }
    }

    /// Element or attribute name.
    pub fn name(&self) -> Option<&'d str> {
        let tree: &'d DomTree = &self.doc.tree;
        match self.node {
            XNode::Node(id) => tree.element_name(id),
            XNode::Attr(owner, index) => Some(tree.attrs(owner)[index].0.as_str()),
        }
    }
}

/// An ordered node-set produced by a query, in document order.
#[derive(Clone)]
pub struct Selectors<'d> {
    doc: &'d Document,
    nodes: Vec<XNode>,
}

impl std::fmt::Debug for Selectors<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.nodes).finish()
    }
}

impl<'d> Selectors<'d> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Selector<'d>> {
        self.nodes.get(index).map(|&node| Selector {
            doc: self.doc,
            node,
        })
    }

    pub fn first(&self) -> Option<Selector<'d>> {
        self.get(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Selector<'d>> + '_ {
        self.nodes.iter().map(|&node| Selector {
            doc: self.doc,
            node,
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.iter().map(|s| s.text()).collect()
    }

    pub fn htmls(&self) -> Vec<String> {
        self.iter().map(|s| s.html()).collect()
    }

    pub fn inner_htmls(&self) -> Vec<String> {
        self.iter().map(|s| s.inner_html()).collect()
    }

    /// Attribute values, one per node; nodes without the attribute yield an empty string.
    pub fn attrs(&self, name: &str) -> Vec<String> {
        self.iter()
            .map(|s| s.attr(name).unwrap_or_default().to_string())
            .collect()
    }
}

impl<'d> IntoIterator for Selectors<'d> {
    type Item = Selector<'d>;
    type IntoIter = std::vec::IntoIter<Selector<'d>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter().collect::<Vec<_>>().into_iter()
    }
}
