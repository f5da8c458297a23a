//! Arena-backed, immutable element tree.
//!
//! A [`Document`] owns every node in a single `Vec`, addressed by
//! [`NodeId`]. Parents are plain indices (non-owning, used for upward
//! walks only). Text nodes are interleaved with element children so
//! aggregated text keeps source order.
//!
//! Documents are assembled once through [`DocumentBuilder`] and are
//! read-only afterwards, which makes them safe to share across threads
//! during candidate scoring.
//!
//! # Example
//!
//! ```rust
//! use adaptive_locator_core::dom::DocumentBuilder;
//!
//! let mut b = DocumentBuilder::new();
//! b.open("div", [("class", "card")]);
//! b.open("h2", Vec::<(&str, &str)>::new());
//! b.text("Gaming Laptop");
//! b.close();
//! b.close();
//! let doc = b.finish();
//!
//! let root = doc.root().unwrap();
//! assert_eq!(doc.element(root).unwrap().tag(), "div");
//! assert_eq!(doc.text(root), "Gaming Laptop");
//! ```

use std::collections::BTreeMap;

/// Index of a node inside its [`Document`] arena.
pub type NodeId = usize;

#[derive(Debug, Clone)]
enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Per-element data, computed once at build time.
#[derive(Debug, Clone)]
pub struct ElementData {
    tag: String,
    attributes: BTreeMap<String, String>,
    sibling_index: usize,
    sibling_count: usize,
    depth: usize,
    order: usize,
}

impl ElementData {
    /// Lower-cased tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attribute mapping. Keys are unique and lower-cased.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Whitespace-separated tokens of the `class` attribute.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    /// Position among element siblings (0-based).
    pub fn sibling_index(&self) -> usize {
        self.sibling_index
    }

    /// Number of element siblings, including this element.
    pub fn sibling_count(&self) -> usize {
        self.sibling_count
    }

    /// Distance from the root element (root = 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Document-order index over elements. Used only for tie-breaks.
    pub fn order(&self) -> usize {
        self.order
    }
}

/// An immutable parsed document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    elements: Vec<NodeId>,
    host: Option<String>,
}

impl Document {
    /// First top-level element, if any.
    pub fn root(&self) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|&id| self.element(id).is_some())
    }

    /// Host the document was fetched from, used as the default domain key.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = Some(host.into());
    }

    /// Number of elements (text nodes excluded).
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// All elements in document order.
    pub fn elements(&self) -> &[NodeId] {
        &self.elements
    }

    /// Element data for `id`, or `None` if `id` is out of range or a text node.
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.nodes.get(id).map(|n| &n.kind) {
            Some(NodeKind::Element(data)) => Some(data),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Element children of `id`, in order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(move |&c| self.element(c).is_some())
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Text held directly by `id` (not by its descendants), space-joined.
    pub fn direct_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(node) = self.nodes.get(id) {
            for &c in &node.children {
                if let NodeKind::Text(t) = &self.nodes[c].kind {
                    push_segment(&mut out, t);
                }
            }
        }
        out
    }

    /// Aggregated descendant text of `id` in document order, space-joined.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let Some(node) = self.nodes.get(n) else {
                continue;
            };
            match &node.kind {
                NodeKind::Text(t) => push_segment(&mut out, t),
                NodeKind::Element(_) => stack.extend(node.children.iter().rev()),
            }
        }
        out
    }

    /// Direct text segments of `id` (used by the candidate filter).
    pub(crate) fn text_segments(&self, id: NodeId) -> impl Iterator<Item = &str> + '_ {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |&c| match &self.nodes[c].kind {
                NodeKind::Text(t) => Some(t.as_str()),
                NodeKind::Element(_) => None,
            })
    }
}

fn push_segment(out: &mut String, segment: &str) {
    let segment = segment.trim();
    if segment.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(segment);
}

/// Incremental builder used by markup parsers.
///
/// Elements are opened and closed in source order; sibling counts and
/// depths are filled in by [`finish`](DocumentBuilder::finish).
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    doc: Document,
    open: Vec<NodeId>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new element as a child of the current one.
    ///
    /// Tag and attribute names are lower-cased; the first occurrence of a
    /// duplicate attribute wins.
    pub fn open<K, V, I>(&mut self, tag: &str, attributes: I) -> NodeId
    where
        K: AsRef<str>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut attrs = BTreeMap::new();
        for (k, v) in attributes {
            attrs
                .entry(k.as_ref().to_ascii_lowercase())
                .or_insert_with(|| v.into());
        }
        let order = self.doc.elements.len();
        let depth = self.open.len();
        let id = self.push(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: attrs,
            sibling_index: 0,
            sibling_count: 0,
            depth,
            order,
        }));
        self.doc.elements.push(id);
        self.open.push(id);
        id
    }

    /// Append a text node to the current element.
    pub fn text(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.push(NodeKind::Text(text.to_string()));
    }

    /// Close the current element. Extra closes are ignored.
    pub fn close(&mut self) {
        self.open.pop();
    }

    /// Close open elements up to and including the nearest one named `tag`.
    ///
    /// Returns `false` (and closes nothing) when no such element is open.
    pub fn close_named(&mut self, tag: &str) -> bool {
        let tag = tag.to_ascii_lowercase();
        let pos = self
            .open
            .iter()
            .rposition(|&id| self.doc.element(id).is_some_and(|e| e.tag == tag));
        match pos {
            Some(p) => {
                self.open.truncate(p);
                true
            }
            None => false,
        }
    }

    /// Name of the innermost open element.
    pub fn current_tag(&self) -> Option<&str> {
        self.open
            .last()
            .and_then(|&id| self.doc.element(id))
            .map(|e| e.tag.as_str())
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.doc.set_host(host);
    }

    /// Finalize sibling indices and counts.
    pub fn finish(mut self) -> Document {
        let parents: Vec<Vec<NodeId>> = std::iter::once(self.doc.roots.clone())
            .chain(self.doc.nodes.iter().map(|n| n.children.clone()))
            .collect();
        for group in parents {
            let elems: Vec<NodeId> = group
                .into_iter()
                .filter(|&c| self.doc.element(c).is_some())
                .collect();
            let count = elems.len();
            for (i, id) in elems.into_iter().enumerate() {
                if let NodeKind::Element(data) = &mut self.doc.nodes[id].kind {
                    data.sibling_index = i;
                    data.sibling_count = count;
                }
            }
        }
        self.doc
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = self.doc.nodes.len();
        let parent = self.open.last().copied();
        self.doc.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.doc.nodes[p].children.push(id),
            None => self.doc.roots.push(id),
        }
        id
    }
}
