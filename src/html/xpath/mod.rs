//! A compact XPath 1.0 engine evaluated against [`DomTree`] arenas.
//!
//! Supports every axis except `namespace`, name / `node()` / `text()` /
//! `comment()` node tests, predicates, unions, boolean, comparison and
//! arithmetic operators and the core string, number and node-set function
//! library. Variables and extension functions are not supported.

mod eval;
mod parser;

pub use eval::{Value, XNode};

use crate::error::QueryError;
use crate::html::dom::DomTree;
use parser::Expr;

/// A parsed XPath expression, reusable against any document.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    source: String,
    expr: Expr,
}

impl CompiledQuery {
    pub fn compile(source: &str) -> Result<Self, QueryError> {
        let expr = parser::parse(source)?;
        Ok(CompiledQuery {
            source: source.to_string(),
            expr,
        })
    }

    /// The XPath text this query was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, tree: &DomTree, context: XNode) -> Value {
        eval::evaluate(tree, &self.expr, context)
    }

    /// Evaluates the query and returns the matched nodes in document order.
    /// Expressions that do not produce a node-set select nothing.
    pub fn select(&self, tree: &DomTree, context: XNode) -> Vec<XNode> {
        match self.evaluate(tree, context) {
            Value::Nodes(nodes) => nodes,
            _ => Vec::new(),
        }
    }
}
