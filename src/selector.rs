//! CSS-subset literal locator.
//!
//! [`CssSelector`] implements [`LocatorResolver`] for a small, commonly
//! used slice of CSS:
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `div`, `*` | type / universal |
//! | `.name`, `#name` | class token / id |
//! | `[a]`, `[a=v]` | attribute present / equal (value quoted or bare) |
//! | `[a^=v]`, `[a$=v]`, `[a*=v]` | prefix / suffix / substring |
//! | `A B`, `A > B` | descendant / child |
//! | `A, B` | union |
//!
//! Pseudo-classes, sibling combinators, and namespaces are rejected as
//! invalid locators. Matches come back in document order without
//! duplicates.

use adaptive_locator_core::dom::{Document, ElementData, NodeId};
use adaptive_locator_core::{Error, LocatorResolver, Result};

/// Resolves locators as CSS selectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssSelector;

impl LocatorResolver for CssSelector {
    fn resolve(&self, doc: &Document, locator: &str) -> Result<Vec<NodeId>> {
        Ok(SelectorList::parse(locator)?.select(doc))
    }
}

/// A parsed, comma-separated selector group.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorList(Vec<Complex>);

#[derive(Debug, Clone, PartialEq)]
struct Complex {
    /// Left to right; `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    universal: bool,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, PartialEq)]
enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl SelectorList {
    pub fn parse(locator: &str) -> Result<Self> {
        Parser::new(locator).parse_list()
    }

    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        self.0.iter().any(|c| c.matches(doc, id))
    }

    /// Matching elements in document order.
    pub fn select(&self, doc: &Document) -> Vec<NodeId> {
        doc.elements()
            .iter()
            .copied()
            .filter(|&id| self.matches(doc, id))
            .collect()
    }
}

impl Complex {
    fn matches(&self, doc: &Document, id: NodeId) -> bool {
        self.matches_at(doc, id, self.compounds.len() - 1)
    }

    fn matches_at(&self, doc: &Document, id: NodeId, i: usize) -> bool {
        let Some(el) = doc.element(id) else {
            return false;
        };
        if !self.compounds[i].matches(el) {
            return false;
        }
        if i == 0 {
            return true;
        }
        match self.combinators[i - 1] {
            Combinator::Child => doc
                .parent(id)
                .is_some_and(|p| self.matches_at(doc, p, i - 1)),
            Combinator::Descendant => doc.ancestors(id).any(|a| self.matches_at(doc, a, i - 1)),
        }
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && !self.universal
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attrs.is_empty()
    }

    fn matches(&self, el: &ElementData) -> bool {
        if let Some(tag) = &self.tag {
            if el.tag() != tag {
                return false;
            }
        }
        self.ids.iter().all(|id| el.attr("id") == Some(id.as_str()))
            && self.classes.iter().all(|c| el.classes().any(|t| t == c))
            && self.attrs.iter().all(|a| a.matches(el))
    }
}

impl AttrSelector {
    fn matches(&self, el: &ElementData) -> bool {
        let Some(value) = el.attr(&self.name) else {
            return false;
        };
        match &self.op {
            AttrOp::Exists => true,
            AttrOp::Equals(v) => value == v,
            AttrOp::Prefix(v) => !v.is_empty() && value.starts_with(v.as_str()),
            AttrOp::Suffix(v) => !v.is_empty() && value.ends_with(v.as_str()),
            AttrOp::Contains(v) => !v.is_empty() && value.contains(v.as_str()),
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::InvalidLocator {
            locator: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Skip whitespace; returns whether any was skipped.
    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse_list(&mut self) -> Result<SelectorList> {
        let mut group = Vec::new();
        loop {
            self.skip_ws();
            group.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(',') => self.pos += 1,
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            }
        }
        Ok(SelectorList(group))
    }

    fn parse_complex(&mut self) -> Result<Complex> {
        let first = self.parse_compound()?;
        if first.is_empty() {
            return Err(match self.peek() {
                None => self.error("empty selector"),
                Some(c) => self.error(format!("unexpected '{}'", c)),
            });
        }
        let mut compounds = vec![first];
        let mut combinators = Vec::new();
        loop {
            let spaced = self.skip_ws();
            let combinator = match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_ws();
                    Combinator::Child
                }
                Some('+') | Some('~') => {
                    return Err(self.error("sibling combinators are not supported"))
                }
                Some(_) if spaced => Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            };
            let next = self.parse_compound()?;
            if next.is_empty() {
                return Err(self.error("combinator without a following selector"));
            }
            combinators.push(combinator);
            compounds.push(next);
        }
        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::default();
        if self.eat('*') {
            compound.universal = true;
        } else if let Some(tag) = self.ident() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    let class = self.ident().ok_or_else(|| self.error("expected class name after '.'"))?;
                    compound.classes.push(class);
                }
                Some('#') => {
                    self.pos += 1;
                    let id = self.ident().ok_or_else(|| self.error("expected id after '#'"))?;
                    compound.ids.push(id);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => return Err(self.error("pseudo-classes are not supported")),
                _ => break,
            }
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<AttrSelector> {
        self.skip_ws();
        let name = self
            .ident()
            .ok_or_else(|| self.error("expected attribute name"))?
            .to_ascii_lowercase();
        self.skip_ws();
        if self.eat(']') {
            return Ok(AttrSelector {
                name,
                op: AttrOp::Exists,
            });
        }
        let op: fn(String) -> AttrOp = match self.peek() {
            Some('=') => AttrOp::Equals,
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some('*') => AttrOp::Contains,
            Some(c) => return Err(self.error(format!("unsupported attribute operator '{}'", c))),
            None => return Err(self.error("unterminated attribute selector")),
        };
        if self.peek() != Some('=') {
            self.pos += 1;
        }
        if !self.eat('=') {
            return Err(self.error("expected '=' in attribute operator"));
        }
        self.skip_ws();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != q) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("unterminated quoted value"));
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                value
            }
            _ => self
                .ident()
                .ok_or_else(|| self.error("expected attribute value"))?,
        };
        self.skip_ws();
        if !self.eat(']') {
            return Err(self.error("expected ']'"));
        }
        Ok(AttrSelector {
            name,
            op: op(value),
        })
    }

    fn ident(&mut self) -> Option<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii())
        {
            self.pos += 1;
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }
}
