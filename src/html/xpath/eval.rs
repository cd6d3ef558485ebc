//! XPath evaluation over a [`DomTree`].

use super::parser::{ArithOp, Axis, CmpOp, Expr, Function, NodeTest, Step};
use crate::html::dom::{DomTree, NodeData, NodeId};

/// A node reachable by an XPath expression: a tree node or one attribute of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XNode {
    Node(NodeId),
    Attr(NodeId, usize),
}

impl XNode {
    fn order_key(self) -> (NodeId, usize) {
        match self {
            XNode::Node(id) => (id, 0),
            XNode::Attr(id, index) => (id, index + 1),
        }
    }

    /// The tree node, or the element owning the attribute.
    pub fn owner(self) -> NodeId {
        match self {
            XNode::Node(id) | XNode::Attr(id, _) => id,
        }
    }
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nodes(Vec<XNode>),
    String(String),
    Number(f64),
    Boolean(bool),
}

#[derive(Clone, Copy)]
struct Focus {
    node: XNode,
    position: usize,
    size: usize,
}

pub(crate) fn evaluate(tree: &DomTree, expr: &Expr, context: XNode) -> Value {
    let evaluator = Evaluator { tree };
    evaluator.eval(
        expr,
        Focus {
            node: context,
            position: 1,
            size: 1,
        },
    )
}

struct Evaluator<'t> {
    tree: &'t DomTree,
}

impl<'t> Evaluator<'t> {
    fn eval(&self, expr: &Expr, focus: Focus) -> Value {
        match expr {
            Expr::Or(left, right) => Value::Boolean(
                self.boolean(&self.eval(left, focus)) || self.boolean(&self.eval(right, focus)),
            ),
            Expr::And(left, right) => Value::Boolean(
                self.boolean(&self.eval(left, focus)) && self.boolean(&self.eval(right, focus)),
            ),
            Expr::Compare(op, left, right) => {
                let left = self.eval(left, focus);
                let right = self.eval(right, focus);
                Value::Boolean(self.compare(*op, &left, &right))
            }
            Expr::Arith(op, left, right) => {
                let left = self.number(&self.eval(left, focus));
                let right = self.number(&self.eval(right, focus));
                Value::Number(match op {
                    ArithOp::Add => left + right,
                    ArithOp::Sub => left - right,
                    ArithOp::Mul => left * right,
                    ArithOp::Div => left / right,
                    ArithOp::Mod => left % right,
                })
            }
            Expr::Negate(operand) => Value::Number(-self.number(&self.eval(operand, focus))),
            Expr::Union(left, right) => {
                let mut nodes = self.nodes(self.eval(left, focus));
                nodes.extend(self.nodes(self.eval(right, focus)));
                Value::Nodes(sort_unique(nodes))
            }
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    XNode::Node(self.tree.root())
                } else {
                    focus.node
                };
                Value::Nodes(self.walk(vec![start], steps))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let mut nodes = self.nodes(self.eval(primary, focus));
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate);
                }
                Value::Nodes(self.walk(nodes, steps))
            }
            Expr::Literal(text) => Value::String(text.clone()),
            Expr::Number(value) => Value::Number(*value),
            Expr::Call(function, args) => self.call(*function, args, focus),
        }
    }

    fn nodes(&self, value: Value) -> Vec<XNode> {
        match value {
            Value::Nodes(nodes) => nodes,
            _ => Vec::new(),
        }
    }

    fn walk(&self, mut current: Vec<XNode>, steps: &[Step]) -> Vec<XNode> {
        for step in steps {
            let mut next = Vec::new();
            for &node in &current {
                let mut matched: Vec<XNode> = self
                    .axis(step.axis, node)
                    .into_iter()
                    .filter(|&candidate| self.test(step.axis, &step.test, candidate))
                    .collect();
                for predicate in &step.predicates {
                    matched = self.filter(matched, predicate);
                }
                next.extend(matched);
            }
            current = sort_unique(next);
        }
        current
    }

    /// Keeps the nodes for which the predicate holds, numbering them in list order.
    fn filter(&self, nodes: Vec<XNode>, predicate: &Expr) -> Vec<XNode> {
        let size = nodes.len();
        nodes
            .into_iter()
            .enumerate()
            .filter(|&(index, node)| {
                let focus = Focus {
                    node,
                    position: index + 1,
                    size,
                };
                match self.eval(predicate, focus) {
                    Value::Number(n) => n == (index + 1) as f64,
                    other => self.boolean(&other),
                }
            })
            .map(|(_, node)| node)
            .collect()
    }

    /// Nodes on `axis` from `node`, in proximity order.
    fn axis(&self, axis: Axis, node: XNode) -> Vec<XNode> {
        let tree = self.tree;
        let id = match node {
            XNode::Node(id) => id,
            XNode::Attr(owner, _) => {
                return match axis {
                    Axis::SelfAxis => vec![node],
                    Axis::Parent => vec![XNode::Node(owner)],
                    Axis::AncestorOrSelf => {
                        let mut out = vec![node];
                        out.extend(self.ancestors(owner, true));
                        out
                    }
                    Axis::Ancestor => self.ancestors(owner, true),
                    Axis::Following => (owner + 1..tree.len()).map(XNode::Node).collect(),
                    Axis::Preceding => self.preceding(owner),
                    _ => Vec::new(),
                };
            }
        };

        match axis {
            Axis::Child => tree.children(id).iter().copied().map(XNode::Node).collect(),
            Axis::Descendant => tree.descendants(id).map(XNode::Node).collect(),
            Axis::DescendantOrSelf => (id..=tree.subtree_end(id)).map(XNode::Node).collect(),
            Axis::SelfAxis => vec![node],
            Axis::Parent => tree.parent(id).map(XNode::Node).into_iter().collect(),
            Axis::Ancestor => self.ancestors(id, false),
            Axis::AncestorOrSelf => self.ancestors(id, true),
            Axis::FollowingSibling => tree
                .following_siblings(id)
                .iter()
                .copied()
                .map(XNode::Node)
                .collect(),
            Axis::PrecedingSibling => tree
                .preceding_siblings(id)
                .iter()
                .rev()
                .copied()
                .map(XNode::Node)
                .collect(),
            Axis::Following => (tree.subtree_end(id) + 1..tree.len())
                .map(XNode::Node)
                .collect(),
            Axis::Preceding => self.preceding(id),
            Axis::Attribute => (0..tree.attrs(id).len())
                .map(|index| XNode::Attr(id, index))
                .collect(),
        }
    }

    fn ancestors(&self, id: NodeId, include_self: bool) -> Vec<XNode> {
        let mut out = Vec::new();
        if include_self {
            out.push(XNode::Node(id));
        }
        let mut current = self.tree.parent(id);
        while let Some(parent) = current {
            out.push(XNode::Node(parent));
            current = self.tree.parent(parent);
        }
        out
    }

    fn preceding(&self, id: NodeId) -> Vec<XNode> {
        let ancestors: Vec<XNode> = self.ancestors(id, false);
        (0..id)
            .rev()
            .map(XNode::Node)
            .filter(|node| !ancestors.contains(node))
            .collect()
    }

    fn test(&self, axis: Axis, test: &NodeTest, node: XNode) -> bool {
        let tree = self.tree;
        match node {
            XNode::Attr(owner, index) => {
                let name = &tree.attrs(owner)[index].0;
                match test {
                    NodeTest::AnyName | NodeTest::Node => true,
                    NodeTest::Name(wanted) => name.eq_ignore_ascii_case(wanted),
                    NodeTest::Text | NodeTest::Comment => false,
                }
            }
            XNode::Node(id) => {
                if axis == Axis::Attribute {
                    return false;
                }
                let data = &tree.node(id).data;
                match test {
                    NodeTest::Node => true,
                    NodeTest::AnyName => matches!(data, NodeData::Element { .. }),
                    NodeTest::Name(wanted) => match data {
                        NodeData::Element { name, .. } => name.eq_ignore_ascii_case(wanted),
                        _ => false,
                    },
                    NodeTest::Text => matches!(data, NodeData::Text(_)),
                    NodeTest::Comment => matches!(data, NodeData::Comment(_)),
                }
            }
        }
    }

    fn string_of(&self, node: XNode) -> String {
        match node {
            XNode::Node(id) => self.tree.text(id),
            XNode::Attr(owner, index) => self.tree.attrs(owner)[index].1.clone(),
        }
    }

    fn name_of(&self, node: XNode) -> String {
        match node {
            XNode::Node(id) => self.tree.element_name(id).unwrap_or_default().to_string(),
            XNode::Attr(owner, index) => self.tree.attrs(owner)[index].0.clone(),
        }
    }

    fn string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(nodes) => nodes
                .first()
                .map(|&node| self.string_of(node))
                .unwrap_or_default(),
            Value::String(text) => text.clone(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
        }
    }

    fn number(&self, value: &Value) -> f64 {
        match value {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => parse_number(&self.string(other)),
        }
    }

    fn boolean(&self, value: &Value) -> bool {
        match value {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::String(text) => !text.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
        }
    }

    fn compare(&self, op: CmpOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(nodes), Value::Boolean(b)) => {
                compare_atoms(op, &Atom::Bool(!nodes.is_empty()), &Atom::Bool(*b))
            }
            (Value::Boolean(b), Value::Nodes(nodes)) => {
                compare_atoms(op, &Atom::Bool(*b), &Atom::Bool(!nodes.is_empty()))
            }
            (Value::Nodes(left), Value::Nodes(right)) => {
                let right: Vec<String> = right.iter().map(|&n| self.string_of(n)).collect();
                left.iter().any(|&l| {
                    let l = self.string_of(l);
                    right
                        .iter()
                        .any(|r| compare_atoms(op, &Atom::Str(&l), &Atom::Str(r)))
                })
            }
            (Value::Nodes(nodes), other) => {
                let other_text = self.string(other);
                let other = atom(other, &other_text);
                nodes.iter().any(|&n| {
                    let text = self.string_of(n);
                    compare_atoms(op, &Atom::Str(&text), &other)
                })
            }
            (other, Value::Nodes(nodes)) => {
                let other_text = self.string(other);
                let other = atom(other, &other_text);
                nodes.iter().any(|&n| {
                    let text = self.string_of(n);
                    compare_atoms(op, &other, &Atom::Str(&text))
                })
            }
            (left, right) => {
                let (left_text, right_text) = (self.string(left), self.string(right));
                compare_atoms(op, &atom(left, &left_text), &atom(right, &right_text))
            }
        }
    }

    fn arg_string(&self, args: &[Expr], index: usize, focus: Focus) -> String {
        match args.get(index) {
            Some(expr) => self.string(&self.eval(expr, focus)),
            None => self.string_of(focus.node),
        }
    }

    fn arg_number(&self, args: &[Expr], index: usize, focus: Focus) -> f64 {
        match args.get(index) {
            Some(expr) => self.number(&self.eval(expr, focus)),
            None => parse_number(&self.string_of(focus.node)),
        }
    }

    fn call(&self, function: Function, args: &[Expr], focus: Focus) -> Value {
        match function {
            Function::Last => Value::Number(focus.size as f64),
            Function::Position => Value::Number(focus.position as f64),
            Function::Count => {
                Value::Number(self.nodes(self.eval(&args[0], focus)).len() as f64)
            }
            Function::Not => Value::Boolean(!self.boolean(&self.eval(&args[0], focus))),
            Function::True => Value::Boolean(true),
            Function::False => Value::Boolean(false),
            Function::Boolean => Value::Boolean(self.boolean(&self.eval(&args[0], focus))),
            Function::Number => Value::Number(self.arg_number(args, 0, focus)),
            Function::String => Value::String(self.arg_string(args, 0, focus)),
            Function::Concat => Value::String(
                (0..args.len())
                    .map(|index| self.arg_string(args, index, focus))
                    .collect(),
            ),
            Function::Contains => {
                let haystack = self.arg_string(args, 0, focus);
                Value::Boolean(haystack.contains(&self.arg_string(args, 1, focus)))
            }
            Function::StartsWith => {
                let haystack = self.arg_string(args, 0, focus);
                Value::Boolean(haystack.starts_with(&self.arg_string(args, 1, focus)))
            }
            Function::EndsWith => {
                let haystack = self.arg_string(args, 0, focus);
                Value::Boolean(haystack.ends_with(&self.arg_string(args, 1, focus)))
            }
            Function::Substring => {
                let text = self.arg_string(args, 0, focus);
                let start = round(self.arg_number(args, 1, focus));
                let end = if args.len() > 2 {
                    start + round(self.arg_number(args, 2, focus))
                } else {
                    f64::INFINITY
                };
                Value::String(
                    text.chars()
                        .enumerate()
                        .filter(|&(index, _)| {
                            let position = (index + 1) as f64;
                            position >= start && position < end
                        })
                        .map(|(_, ch)| ch)
                        .collect(),
                )
            }
            Function::SubstringBefore => {
                let text = self.arg_string(args, 0, focus);
                let needle = self.arg_string(args, 1, focus);
                Value::String(
                    text.find(&needle)
                        .map(|index| text[..index].to_string())
                        .unwrap_or_default(),
                )
            }
            Function::SubstringAfter => {
                let text = self.arg_string(args, 0, focus);
                let needle = self.arg_string(args, 1, focus);
                Value::String(
                    text.find(&needle)
                        .map(|index| text[index + needle.len()..].to_string())
                        .unwrap_or_default(),
                )
            }
            Function::StringLength => {
                Value::Number(self.arg_string(args, 0, focus).chars().count() as f64)
            }
            Function::NormalizeSpace => Value::String(
                self.arg_string(args, 0, focus)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Function::Translate => {
                let text = self.arg_string(args, 0, focus);
                let from: Vec<char> = self.arg_string(args, 1, focus).chars().collect();
                let to: Vec<char> = self.arg_string(args, 2, focus).chars().collect();
                Value::String(
                    text.chars()
                        .filter_map(|ch| match from.iter().position(|&f| f == ch) {
                            Some(index) => to.get(index).copied(),
                            None => Some(ch),
                        })
                        .collect(),
                )
            }
            Function::Name | Function::LocalName => {
                let node = match args.first() {
                    Some(expr) => self.nodes(self.eval(expr, focus)).first().copied(),
                    None => Some(focus.node),
                };
                let name = node.map(|n| self.name_of(n)).unwrap_or_default();
                if function == Function::LocalName {
                    let local = name.rsplit(':').next().unwrap_or_default().to_string();
                    Value::String(local)
                } else {
                    Value::String(name)
                }
            }
            Function::Sum => Value::Number(
                self.nodes(self.eval(&args[0], focus))
                    .into_iter()
                    .map(|node| parse_number(&self.string_of(node)))
                    .sum(),
            ),
            Function::Floor => Value::Number(self.arg_number(args, 0, focus).floor()),
            Function::Ceiling => Value::Number(self.arg_number(args, 0, focus).ceil()),
            Function::Round => Value::Number(round(self.arg_number(args, 0, focus))),
        }
    }
}

enum Atom<'s> {
    Str(&'s str),
    Num(f64),
    Bool(bool),
}

fn atom<'s>(value: &Value, text: &'s str) -> Atom<'s> {
    match value {
        Value::Number(n) => Atom::Num(*n),
        Value::Boolean(b) => Atom::Bool(*b),
        _ => Atom::Str(text),
    }
}

fn compare_atoms(op: CmpOp, left: &Atom<'_>, right: &Atom<'_>) -> bool {
    let to_bool = |a: &Atom<'_>| match a {
        Atom::Str(s) => !s.is_empty(),
        Atom::Num(n) => *n != 0.0 && !n.is_nan(),
        Atom::Bool(b) => *b,
    };
    let to_num = |a: &Atom<'_>| match a {
        Atom::Str(s) => parse_number(s),
        Atom::Num(n) => *n,
        Atom::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
    };

    match op {
        CmpOp::Eq | CmpOp::Neq => {
            let equal = match (left, right) {
                (Atom::Bool(_), _) | (_, Atom::Bool(_)) => to_bool(left) == to_bool(right),
                (Atom::Num(_), _) | (_, Atom::Num(_)) => to_num(left) == to_num(right),
                (Atom::Str(l), Atom::Str(r)) => l == r,
            };
            (op == CmpOp::Eq) == equal
        }
        CmpOp::Lt => to_num(left) < to_num(right),
        CmpOp::Le => to_num(left) <= to_num(right),
        CmpOp::Gt => to_num(left) > to_num(right),
        CmpOp::Ge => to_num(left) >= to_num(right),
    }
}

fn sort_unique(mut nodes: Vec<XNode>) -> Vec<XNode> {
    nodes.sort_by_key(|node| node.order_key());
    nodes.dedup();
    nodes
}

fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

/// XPath number conversion: optional sign, digits and at most one dot; anything else is NaN.
pub(crate) fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1
        && digits != ".";
    if valid {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_conversion_is_strict() {
        assert_eq!(parse_number(" 42 "), 42.0);
        assert_eq!(parse_number("-1.5"), -1.5);
        assert!(parse_number("1e3").is_nan());
        assert!(parse_number("+1").is_nan());
        assert!(parse_number("").is_nan());
        assert!(parse_number(".").is_nan());
    }

    #[test]
    fn numbers_format_without_trailing_zeroes() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn string_equality_falls_back_to_numbers_when_one_side_is_numeric() {
        assert!(compare_atoms(CmpOp::Eq, &Atom::Str("2.0"), &Atom::Num(2.0)));
        assert!(!compare_atoms(CmpOp::Eq, &Atom::Str("2.0"), &Atom::Str("2")));
        assert!(!compare_atoms(CmpOp::Lt, &Atom::Str("10"), &Atom::Str("9")));
        assert!(compare_atoms(CmpOp::Neq, &Atom::Bool(true), &Atom::Str("")));
    }
}
