//! CSS selector to XPath compiler.
//!
//! Each lexeme is one regular expression anchored at the current offset; the
//! recursive-descent functions below consume lexemes straight off the input
//! string without a separate tokenization pass.
//!
//! ```text
//! selectors := selector (',' selector)*
//! selector  := combinator? sequence (combinator sequence)*
//! sequence  := element? qualifier*
//! qualifier := '.' class | '#' id | '[' attr (op value)? ']' | ':' pseudo-class
//! ```

use crate::error::QueryError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Where a compiled selector starts matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// From the document root.
    Global,
    /// Below the context node; the XPath is prefixed with `.`.
    Local,
}

#[derive(Debug, Clone, Copy)]
enum Lexeme {
    Spaces,
    Comma,
    Element,
    Class,
    Id,
    LBracket,
    RBracket,
    AttrName,
    AttrValue,
    BareValue,
    MatchOp,
    PseudoClass,
    LParen,
    RParen,
    Odd,
    Even,
    Binomial,
    Signed,
    AdjacentTo,
    Precedes,
    ParentOf,
    AncestorOf,
}

const PATTERNS: [&str; 22] = [
    r"\s+",
    r"\s*,",
    r"\*|[_a-zA-Z][-\w]*",
    r"\.[-\w]+",
    r"\#[-\w]+",
    r"\[",
    r"\]",
    r"[-_:a-zA-Z][-\w:.]*",
    r#""(\\.|[^"\\])*"|'(\\.|[^'\\])*'"#,
    r"[-\w]+",
    r"=|~=|\|=|\^=|\$=|\*=",
    r":[-a-zA-Z]+",
    r"\s*\(",
    r"\s*\)",
    r"(?i)odd",
    r"(?i)even",
    r"([-+]?\d*)[nN](?:\s*([-+])\s*(\d+))?",
    r"[-+]?\d+",
    r"\s*\+",
    r"\s*~",
    r"\s*>",
    r"\s+",
];

static MATCHERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    PATTERNS
        .iter()
        .map(|pattern| {
            Regex::new(&format!(r"\A(?:{pattern})")).expect("hardcoded lexeme pattern is valid")
        })
        .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    Adjacent,
    Sibling,
    Negation,
}

/// Translates a CSS selector group into an XPath expression.
///
/// ```
/// use crawlkit::html::{css_to_xpath, Scope};
///
/// let xpath = css_to_xpath("ul > li.item", Scope::Global).unwrap();
/// assert_eq!(
///     xpath,
///     r#"/descendant-or-self::*/*[self::ul]/child::*[self::li and contains(concat(" ", @class, " "), " item ")]"#
/// );
/// ```
pub fn css_to_xpath(selector: &str, scope: Scope) -> Result<String, QueryError> {
    let lead = selector.len() - selector.trim_start().len();
    let mut compiler = Compiler {
        original: selector,
        input: selector.trim(),
        lead,
        pos: 0,
        scope,
    };
    if compiler.input.is_empty() {
        return Err(compiler.error("empty selector"));
    }
    compiler.selectors()
}

struct Compiler<'a> {
    original: &'a str,
    input: &'a str,
    lead: usize,
    pos: usize,
    scope: Scope,
}

impl<'a> Compiler<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Consumes `lexeme` if it matches a non-empty prefix of the remaining input.
    fn token(&mut self, lexeme: Lexeme) -> Option<&'a str> {
        let rest = self.rest();
        let found = MATCHERS[lexeme as usize].find(rest)?;
        if found.end() == 0 {
            return None;
        }
        self.pos += found.end();
        Some(&rest[..found.end()])
    }

    fn peek(&self, lexeme: Lexeme) -> bool {
        MATCHERS[lexeme as usize]
            .find(self.rest())
            .is_some_and(|found| found.end() > 0)
    }

    fn skip_spaces(&mut self) {
        self.token(Lexeme::Spaces);
    }

    fn error(&self, reason: &str) -> QueryError {
        QueryError::InvalidCss {
            selector: self.original.to_string(),
            offset: self.lead + self.pos,
            reason: reason.to_string(),
        }
    }

    fn selectors(&mut self) -> Result<String, QueryError> {
        let mut parts = vec![self.selector()?];
        while self.token(Lexeme::Comma).is_some() {
            self.skip_spaces();
            parts.push(self.selector()?);
        }
        if !self.at_end() {
            return Err(self.error("unexpected input"));
        }
        Ok(parts.join(" | "))
    }

    fn selector(&mut self) -> Result<String, QueryError> {
        let mut xpath = String::new();
        if self.scope == Scope::Local {
            xpath.push('.');
        }

        let mut combinator = self.combinator().unwrap_or(Combinator::Descendant);
        loop {
            xpath.push_str(&self.sequence(combinator)?);
            if self.at_end() || self.peek(Lexeme::Comma) {
                break;
            }
            match self.combinator() {
                Some(next) => combinator = next,
                None => break,
            }
        }
        Ok(xpath)
    }

    fn combinator(&mut self) -> Option<Combinator> {
        if self.token(Lexeme::AdjacentTo).is_some() {
            Some(Combinator::Adjacent)
        } else if self.token(Lexeme::Precedes).is_some() {
            Some(Combinator::Sibling)
        } else if self.token(Lexeme::ParentOf).is_some() {
            Some(Combinator::Child)
        } else if self.token(Lexeme::AncestorOf).is_some() {
            Some(Combinator::Descendant)
        } else {
            None
        }
    }

    fn sequence(&mut self, combinator: Combinator) -> Result<String, QueryError> {
        self.skip_spaces();
        let axis = match combinator {
            Combinator::Descendant => "/descendant-or-self::*/*",
            Combinator::Child => "/child::*",
            Combinator::Adjacent | Combinator::Sibling => "/following-sibling::*",
            Combinator::Negation => "",
        };

        let mut predicate = String::new();
        if combinator == Combinator::Adjacent {
            predicate.push_str("position()=1");
        }

        let mut matched = false;
        if let Some(element) = self.token(Lexeme::Element) {
            if !predicate.is_empty() {
                predicate.push_str(" and ");
            }
            predicate.push_str("self::");
            predicate.push_str(&element.to_ascii_lowercase());
            matched = true;
        }

        while let Some((qualifier, connective)) = self.qualifier()? {
            if combinator == Combinator::Negation && connective == "][" {
                return Err(self.error("type-relative pseudo-classes cannot be negated"));
            }
            if !predicate.is_empty() {
                predicate.push_str(connective);
            }
            predicate.push_str(&qualifier);
            matched = true;
        }

        if !matched {
            return Err(self.error("expected an element or a qualifier"));
        }
        if combinator == Combinator::Negation {
            return Ok(predicate);
        }
        Ok(format!("{axis}[{predicate}]"))
    }

    fn qualifier(&mut self) -> Result<Option<(String, &'static str)>, QueryError> {
        if let Some(class) = self.token(Lexeme::Class) {
            return Ok(Some((
                format!(r#"contains(concat(" ", @class, " "), " {} ")"#, &class[1..]),
                " and ",
            )));
        }
        if let Some(id) = self.token(Lexeme::Id) {
            return Ok(Some((format!("@id={}", xpath_literal(&id[1..])), " and ")));
        }
        if self.peek(Lexeme::PseudoClass) {
            return self.pseudo_class().map(Some);
        }
        if self.peek(Lexeme::LBracket) {
            return Ok(Some((self.attribute()?, " and ")));
        }
        Ok(None)
    }

    fn pseudo_class(&mut self) -> Result<(String, &'static str), QueryError> {
        let class = self
            .token(Lexeme::PseudoClass)
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let qualifier = match class.as_str() {
            ":first-child" => ("position()=1".to_string(), " and "),
            ":first-of-type" => ("position()=1".to_string(), "]["),
            ":last-child" => ("position()=last()".to_string(), " and "),
            ":last-of-type" => ("position()=last()".to_string(), "]["),
            ":only-child" => (
                "position() = 1 and position() = last()".to_string(),
                " and ",
            ),
            ":only-of-type" => ("position() = 1 and position() = last()".to_string(), "]["),
            ":nth-child" => (self.nth()?, " and "),
            ":nth-of-type" => (self.nth()?, "]["),
            ":not" => (self.negate()?, " and "),
            _ => return Err(QueryError::UnsupportedPseudoClass(class)),
        };
        Ok(qualifier)
    }

    fn nth(&mut self) -> Result<String, QueryError> {
        if self.token(Lexeme::LParen).is_none() {
            return Err(self.error(":nth-child and :nth-of-type require a parenthesized argument"));
        }
        self.skip_spaces();

        let expr = if self.token(Lexeme::Even).is_some() {
            "position() mod 2 = 0".to_string()
        } else if self.token(Lexeme::Odd).is_some() {
            "position() mod 2 = 1".to_string()
        } else if let Some(captures) = MATCHERS[Lexeme::Binomial as usize].captures(self.rest()) {
            let a = match &captures[1] {
                "" | "+" => 1,
                "-" => -1,
                digits => self.integer(digits)?,
            };
            let b = match (captures.get(2), captures.get(3)) {
                (Some(sign), Some(digits)) => {
                    let b = self.integer(digits.as_str())?;
                    if sign.as_str() == "-" {
                        -b
                    } else {
                        b
                    }
                }
                _ => 0,
            };
            self.pos += captures[0].len();
            nth_predicate(a, b)
        } else if let Some(signed) = self.token(Lexeme::Signed) {
            let b = self.integer(signed)?;
            format!("position() = {b}")
        } else {
            return Err(self.error("invalid argument to :nth-child or :nth-of-type"));
        };

        self.skip_spaces();
        if self.token(Lexeme::RParen).is_none() {
            return Err(self.error("unterminated argument to :nth-child or :nth-of-type"));
        }
        Ok(expr)
    }

    /// Parses an `:nth-*` integer. `i64::MIN` is rejected so every accepted
    /// value can be negated.
    fn integer(&self, digits: &str) -> Result<i64, QueryError> {
        digits
            .trim_start_matches('+')
            .parse::<i64>()
            .ok()
            .filter(|n| *n != i64::MIN)
            .ok_or_else(|| self.error("integer out of range"))
    }

    fn negate(&mut self) -> Result<String, QueryError> {
        self.skip_spaces();
        if self.token(Lexeme::LParen).is_none() {
            return Err(self.error(":not requires a parenthesized argument"));
        }
        self.skip_spaces();
        let inner = self.sequence(Combinator::Negation)?;
        self.skip_spaces();
        if self.token(Lexeme::RParen).is_none() {
            return Err(self.error("unterminated argument to :not"));
        }
        Ok(format!("not({inner})"))
    }

    fn attribute(&mut self) -> Result<String, QueryError> {
        self.token(Lexeme::LBracket);
        self.skip_spaces();
        let name = self
            .token(Lexeme::AttrName)
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| self.error("attribute selector requires an attribute name"))?;
        self.skip_spaces();
        if self.token(Lexeme::RBracket).is_some() {
            return Ok(format!("@{name}"));
        }

        let op = self
            .token(Lexeme::MatchOp)
            .ok_or_else(|| self.error("missing operator in attribute selector"))?;
        self.skip_spaces();
        let value = if let Some(quoted) = self.token(Lexeme::AttrValue) {
            unquote(quoted)
        } else if let Some(bare) = self.token(Lexeme::BareValue) {
            bare.to_string()
        } else {
            return Err(self.error("missing value in attribute selector"));
        };
        self.skip_spaces();
        if self.token(Lexeme::RBracket).is_none() {
            return Err(self.error("unterminated attribute selector"));
        }

        let v = xpath_literal(&value);
        let n = name;
        Ok(match op {
            "=" => format!("@{n}={v}"),
            "~=" => format!(r#"contains(concat(" ", @{n}, " "), concat(" ", {v}, " "))"#),
            "|=" => format!(r#"(@{n}={v} or starts-with(@{n}, concat({v}, "-")))"#),
            "^=" => format!("starts-with(@{n}, {v})"),
            "$=" => format!(
                "substring(@{n}, string-length(@{n}) - string-length({v}) + 1) = {v}"
            ),
            _ => format!("contains(@{n}, {v})"),
        })
    }
}

/// Position predicate for `an+b`: positions `a*k + b` for some `k >= 0`.
fn nth_predicate(a: i64, b: i64) -> String {
    let offset = match b {
        0 => "position()".to_string(),
        b if b > 0 => format!("(position() - {b})"),
        b => format!("(position() + {})", -b),
    };
    match a {
        0 => format!("position() = {b}"),
        a if a > 0 => {
            if b > 1 {
                format!("position() >= {b} and {offset} mod {a} = 0")
            } else {
                format!("{offset} mod {a} = 0")
            }
        }
        a => format!("position() <= {b} and ({b} - position()) mod {} = 0", -a),
    }
}

fn unquote(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Quotes `value` as an XPath string literal.
pub(crate) fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        format!("\"{value}\"")
    } else if !value.contains('\'') {
        format!("'{value}'")
    } else {
        let parts: Vec<String> = value
            .split('"')
            .map(|part| format!("\"{part}\""))
            .collect();
        format!("concat({})", parts.join(", '\"', "))
    }
}
