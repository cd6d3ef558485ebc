//! Immutable document arena.
//!
//! HTML is parsed by `scraper` (html5ever) and then flattened into a
//! pre-order arena: node ids follow document order, and the descendants of a
//! node occupy the contiguous id range `id + 1 ..= subtree_end`. The arena
//! owns plain strings only, so it can be shared freely between tasks.

use scraper::Html;

/// Index of a node in a [`DomTree`]. The document node is always `0`.
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Doctype(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
    Other,
}

#[derive(Debug, Clone)]
pub struct DomNode {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub data: NodeData,
    sibling_index: usize,
    subtree_end: NodeId,
}

/// A parsed HTML document in arena form.
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<DomNode>,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

impl DomTree {
    /// Parses an HTML document. Parsing is error tolerant and always yields a tree.
    pub fn parse(source: &str) -> Self {
        let html = Html::parse_document(source);
        let mut nodes: Vec<DomNode> = Vec::new();
        let mut stack = vec![(html.tree.root(), None::<NodeId>)];

        while let Some((node, parent)) = stack.pop() {
            let id = nodes.len();
            let data = match node.value() {
                scraper::Node::Document | scraper::Node::Fragment => NodeData::Document,
                scraper::Node::Doctype(doctype) => NodeData::Doctype(doctype.name().to_string()),
                scraper::Node::Comment(comment) => NodeData::Comment(comment.comment.to_string()),
                scraper::Node::Text(text) => NodeData::Text(text.text.to_string()),
                scraper::Node::Element(element) => NodeData::Element {
                    name: element.name().to_string(),
                    attrs: element
                        .attrs()
                        .map(|(name, value)| (name.to_string(), value.to_string()))
                        .collect(),
                },
                _ => NodeData::Other,
            };

            let sibling_index = match parent {
                Some(parent_id) => {
                    let siblings = &mut nodes[parent_id].children;
                    siblings.push(id);
                    siblings.len() - 1
                }
                None => 0,
            };

            nodes.push(DomNode {
                parent,
                children: Vec::new(),
                data,
                sibling_index,
                subtree_end: id,
            });

            let children: Vec<_> = node.children().collect();
            for child in children.into_iter().rev() {
                stack.push((child, Some(id)));
            }
        }

        for id in (0..nodes.len()).rev() {
            if let Some(&last_child) = nodes[id].children.last() {
                nodes[id].subtree_end = nodes[last_child].subtree_end;
            }
        }

        DomTree { nodes }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &DomNode {
        &self.nodes[id]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Ids of every descendant of `id`, in document order.
    pub fn descendants(&self, id: NodeId) -> std::ops::RangeInclusive<NodeId> {
        id + 1..=self.nodes[id].subtree_end
    }

    pub fn subtree_end(&self, id: NodeId) -> NodeId {
        self.nodes[id].subtree_end
    }

    /// Siblings after `id`, nearest first.
    pub fn following_siblings(&self, id: NodeId) -> &[NodeId] {
        match self.nodes[id].parent {
            Some(parent) => &self.nodes[parent].children[self.nodes[id].sibling_index + 1..],
            None => &[],
        }
    }

    /// Siblings before `id`, in document order.
    pub fn preceding_siblings(&self, id: NodeId) -> &[NodeId] {
        match self.nodes[id].parent {
            Some(parent) => &self.nodes[parent].children[..self.nodes[id].sibling_index],
            None => &[],
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].data, NodeData::Element { .. })
    }

    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs,
            _ => &[],
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self, id: NodeId) -> String {
        match &self.nodes[id].data {
            NodeData::Text(text) | NodeData::Comment(text) => text.clone(),
            _ => {
                let mut out = String::new();
                for descendant in self.descendants(id) {
                    if let NodeData::Text(text) = &self.nodes[descendant].data {
                        out.push_str(text);
                    }
                }
                out
            }
        }
    }

    /// Serializes the node and its subtree.
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.render(id, &mut out);
        out
    }

    /// Serializes the children of the node.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.render(child, &mut out);
        }
        out
    }

    fn render(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id].data {
            NodeData::Document => {
                for &child in self.children(id) {
                    self.render(child, out);
                }
            }
            NodeData::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeData::Element { name, attrs } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    return;
                }
                for &child in self.children(id) {
                    self.render(child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            NodeData::Text(text) => {
                let raw = self.nodes[id]
                    .parent
                    .and_then(|parent| self.element_name(parent))
                    .is_some_and(|parent| RAW_TEXT_ELEMENTS.contains(&parent));
                if raw {
                    out.push_str(text);
                } else {
                    escape_into(text, false, out);
                }
            }
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Other => {}
        }
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(tree: &DomTree, name: &str) -> NodeId {
        (0..tree.len())
            .find(|&id| tree.element_name(id) == Some(name))
            .unwrap()
    }

    #[test]
    fn ids_follow_document_order() {
        let tree = DomTree::parse("<div><p>a</p><p>b</p></div><span>c</span>");
        let div = find(&tree, "div");
        let span = find(&tree, "span");
        assert!(div < span);
        let paragraphs: Vec<_> = tree
            .descendants(div)
            .filter(|&id| tree.element_name(id) == Some("p"))
            .collect();
        assert_eq!(paragraphs.len(), 2);
        assert!(tree.subtree_end(div) < span);
    }

    #[test]
    fn siblings_are_split_around_the_node() {
        let tree = DomTree::parse("<ul><li>1</li><li id=\"mid\">2</li><li>3</li></ul>");
        let mid = (0..tree.len())
            .find(|&id| tree.attr(id, "id") == Some("mid"))
            .unwrap();
        assert_eq!(tree.preceding_siblings(mid).len(), 1);
        assert_eq!(tree.following_siblings(mid).len(), 1);
        assert_eq!(tree.text(tree.following_siblings(mid)[0]), "3");
    }

    #[test]
    fn renders_escaped_html() {
        let tree = DomTree::parse(r#"<p class="a&quot;b">x &lt; y<br></p>"#);
        let p = find(&tree, "p");
        assert_eq!(tree.outer_html(p), r#"<p class="a&quot;b">x &lt; y<br></p>"#);
        assert_eq!(tree.inner_html(p), "x &lt; y<br>");
        assert_eq!(tree.text(p), "x < y");
    }

    #[test]
    fn script_text_is_not_escaped() {
        let tree = DomTree::parse("<script>if (a < b) {}</script>");
        let script = find(&tree, "script");
        assert_eq!(tree.inner_html(script), "if (a < b) {}");
    }
}
