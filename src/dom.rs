//! Arena-backed markup tree.
//!
//! Nodes live in a single `Vec` and refer to each other through [`NodeId`]
//! indices, so insert-before/remove sequences never alias. Text and
//! attribute values are stored in their escaped source form, which keeps
//! re-serialization byte-for-byte faithful for untouched content.

use crate::error::DocumentError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;
use std::sync::LazyLock;

/// Elements that never have content and must be written self-closed.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// A complete character or entity reference at the start of the input.
static REFERENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z_:][\w.:-]*);").unwrap()
});

/// Stable handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Element name and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `dc:title`.
    pub name: String,
    /// Attributes in source order; values are kept escaped.
    pub attributes: Vec<Attribute>,
    /// Written as `<name/>` when it has no children.
    pub self_closing: bool,
}

impl Element {
    /// Creates an element with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            self_closing: false,
        }
    }

    /// Returns the part of the name after the prefix.
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Returns the namespace prefix, if the name has one.
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }
}

/// A single `key="value"` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    /// Escaped value, without quotes.
    pub value: String,
}

impl Attribute {
    /// Whether this attribute declares a namespace (`xmlns` or `xmlns:*`).
    pub fn is_namespace_declaration(&self) -> bool {
        self.key == "xmlns" || self.key.starts_with("xmlns:")
    }
}

/// Node payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    /// Escaped character data.
    Text(String),
    CData(String),
    Comment(String),
    /// `<?xml ...?>` content between the delimiters.
    Declaration(String),
    ProcessingInstruction(String),
    Doctype(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A mutable markup tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    /// Apply HTML void-element rules when parsing and writing.
    html: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Creates a tree holding only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            html: false,
        }
    }

    /// Parses XML markup leniently.
    ///
    /// Mismatched end tags close back to the nearest open element of the same
    /// name or are ignored when none is open; elements still open at the end
    /// of input are closed implicitly. A `<` that cannot start markup and an
    /// `&` that does not start a reference are read as text.
    pub fn parse(markup: &str) -> Result<Self, DocumentError> {
        Self::parse_with(markup, false)
    }

    /// Parses a content page leniently, as [`Document::parse`] does, and
    /// also applies HTML void-element rules: `br`, `img` and the like never
    /// take children and are always written self-closed.
    pub fn parse_html(markup: &str) -> Result<Self, DocumentError> {
        Self::parse_with(markup, true)
    }

    /// Whether HTML void-element rules apply to this tree.
    pub fn is_html(&self) -> bool {
        self.html
    }

    fn parse_with(markup: &str, html: bool) -> Result<Self, DocumentError> {
        let mut doc = Document::new();
        doc.html = html;
        let markup = escape_stray_delimiters(markup);
        let mut reader = Reader::from_str(&markup);
        let config = reader.config_mut();
        config.trim_text(false);
        config.expand_empty_elements = false;
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.allow_dangling_amp = true;

        let mut stack = vec![doc.root()];

        loop {
            let parent = *stack.last().unwrap_or(&NodeId(0));
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let element = element_from_start(&e, false)?;
                    let is_void = html && is_void_element(element.local_name());
                    let id = doc.append_new(parent, NodeKind::Element(element));
                    if is_void {
                        doc.mark_self_closing(id);
                    } else {
                        stack.push(id);
                    }
                }
                Ok(Event::Empty(e)) => {
                    let element = element_from_start(&e, true)?;
                    doc.append_new(parent, NodeKind::Element(element));
                }
                Ok(Event::End(e)) => {
                    let name = decode_utf8(e.name().as_ref())?;
                    let open = stack
                        .iter()
                        .rposition(|id| doc.element(*id).is_some_and(|el| el.name == name));
                    if let Some(position) = open {
                        stack.truncate(position);
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .decode()
                        .map_err(|err| DocumentError::Parse(format!("Decode error: {:?}", err)))?;
                    doc.push_text(parent, &text);
                }
                Ok(Event::GeneralRef(e)) => {
                    let entity = e
                        .decode()
                        .map_err(|err| DocumentError::Parse(format!("Decode error: {:?}", err)))?;
                    doc.push_text(parent, &format!("&{};", entity));
                }
                Ok(Event::CData(e)) => {
                    let text = decode_utf8(&e)?;
                    doc.append_new(parent, NodeKind::CData(text));
                }
                Ok(Event::Comment(e)) => {
                    let text = decode_utf8(&e)?;
                    doc.append_new(parent, NodeKind::Comment(text));
                }
                Ok(Event::Decl(e)) => {
                    let text = decode_utf8(&e)?;
                    doc.append_new(parent, NodeKind::Declaration(text));
                }
                Ok(Event::PI(e)) => {
                    let text = decode_utf8(&e)?;
                    doc.append_new(parent, NodeKind::ProcessingInstruction(text));
                }
                Ok(Event::DocType(e)) => {
                    let text = decode_utf8(&e)?;
                    doc.append_new(parent, NodeKind::Doctype(text));
                }
                Ok(Event::Eof) => break,
                Err(err) => {
                    return Err(DocumentError::Parse(format!(
                        "XML error at byte {}: {:?}",
                        reader.error_position(),
                        err
                    )));
                }
            }
        }

        Ok(doc)
    }

    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The first element child of the document node.
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|id| self.element(*id).is_some())
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Element children only.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|child| self.element(*child).is_some())
    }

    /// All nodes below `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            out.push(next);
            pending.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Unescaped value of the attribute named `key`.
    pub fn attribute(&self, id: NodeId, key: &str) -> Option<String> {
        let element = self.element(id)?;
        element
            .attributes
            .iter()
            .find(|attr| attr.key == key)
            .map(|attr| unescape_lossy(&attr.value))
    }

    /// Sets an attribute from an already-escaped value, replacing any existing one.
    pub fn set_attribute(&mut self, id: NodeId, key: &str, escaped_value: impl Into<String>) {
        let Some(element) = self.element_mut(id) else {
            return;
        };
        let value = escaped_value.into();
        match element.attributes.iter_mut().find(|attr| attr.key == key) {
            Some(attr) => attr.value = value,
            None => element.attributes.push(Attribute {
                key: key.to_string(),
                value,
            }),
        }
    }

    /// Resolves the namespace URI bound to `prefix` (or the default
    /// namespace when `None`) at `id`, walking up through ancestors.
    pub fn lookup_namespace(&self, id: NodeId, prefix: Option<&str>) -> Option<String> {
        let key = match prefix {
            Some(prefix) => format!("xmlns:{}", prefix),
            None => "xmlns".to_string(),
        };
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(uri) = self.attribute(node, &key) {
                return Some(uri);
            }
            current = self.parent(node);
        }
        None
    }

    /// Namespace URI of the element at `id`.
    pub fn namespace_uri(&self, id: NodeId) -> Option<String> {
        let element = self.element(id)?;
        self.lookup_namespace(id, element.prefix())
    }

    /// Whether the element at `id` is `{namespace}local`.
    pub fn is_named(&self, id: NodeId, namespace: &str, local: &str) -> bool {
        self.element(id).is_some_and(|el| el.local_name() == local)
            && self.namespace_uri(id).as_deref() == Some(namespace)
    }

    /// Descendant elements of `id` matching a namespace-qualified name, in document order.
    pub fn find_all(&self, id: NodeId, namespace: &str, local: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|node| self.is_named(*node, namespace, local))
            .collect()
    }

    /// First descendant element of `id` matching a namespace-qualified name.
    pub fn find_first(&self, id: NodeId, namespace: &str, local: &str) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|node| self.is_named(*node, namespace, local))
    }

    /// Descendant elements with the given local name regardless of namespace.
    pub fn find_all_local(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|node| self.element(*node).is_some_and(|el| el.local_name() == local))
            .collect()
    }

    /// Concatenated, unescaped text of every text and CDATA descendant.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in std::iter::once(id).chain(self.descendants(id)) {
            match self.kind(node) {
                NodeKind::Text(raw) => out.push_str(&unescape_lossy(raw)),
                NodeKind::CData(text) => out.push_str(text),
                _ => {}
            }
        }
        out
    }

    /// Replaces all children of `id` with a single text node of escaped text.
    pub fn set_text(&mut self, id: NodeId, escaped: impl Into<String>) {
        for child in self.children(id).to_vec() {
            self.detach(child);
        }
        self.append_new(id, NodeKind::Text(escaped.into()));
    }

    /// Creates an unattached node.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Appends `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Inserts `node` immediately before `reference` under the same parent.
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> Result<(), DocumentError> {
        let parent = self.parent(reference).ok_or_else(|| {
            DocumentError::ElementNotFound("parent of insertion reference".to_string())
        })?;
        self.detach(node);
        let siblings = &mut self.nodes[parent.0].children;
        let position = siblings
            .iter()
            .position(|sibling| *sibling == reference)
            .unwrap_or(siblings.len());
        siblings.insert(position, node);
        self.nodes[node.0].parent = Some(parent);
        Ok(())
    }

    /// Removes `id` from its parent. The node stays in the arena, unreachable.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }

    /// Deep-copies `id` from `other` into this arena and returns the unattached copy.
    pub fn import(&mut self, other: &Document, id: NodeId) -> NodeId {
        let copy = self.create(other.kind(id).clone());
        for child in other.children(id) {
            let child_copy = self.import(other, *child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Removes and returns the namespace declarations of `id`, tagged with their
    /// original attribute positions so [`Document::restore_attributes`] can put
    /// them back exactly.
    pub fn take_namespace_declarations(&mut self, id: NodeId) -> Vec<(usize, Attribute)> {
        let Some(element) = self.element_mut(id) else {
            return Vec::new();
        };
        let mut taken = Vec::new();
        let mut kept = Vec::new();
        for (position, attr) in element.attributes.drain(..).enumerate() {
            if attr.is_namespace_declaration() {
                taken.push((position, attr));
            } else {
                kept.push(attr);
            }
        }
        element.attributes = kept;
        taken
    }

    /// Reinserts attributes previously removed with their positions.
    pub fn restore_attributes(&mut self, id: NodeId, saved: Vec<(usize, Attribute)>) {
        let Some(element) = self.element_mut(id) else {
            return;
        };
        for (position, attr) in saved {
            let position = position.min(element.attributes.len());
            element.attributes.insert(position, attr);
        }
    }

    /// Serializes the whole document.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            self.write_node(*child, &mut out);
        }
        out
    }

    /// Serializes a node including its own tags.
    pub fn outer_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    /// Serializes only the children of a node.
    pub fn inner_markup(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_node(*child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Document => {
                for child in self.children(id) {
                    self.write_node(*child, out);
                }
            }
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(&element.name);
                for attr in &element.attributes {
                    let quote = if attr.value.contains('"') { '\'' } else { '"' };
                    out.push(' ');
                    out.push_str(&attr.key);
                    out.push('=');
                    out.push(quote);
                    out.push_str(&attr.value);
                    out.push(quote);
                }
                if self.html && is_void_element(element.local_name()) {
                    out.push_str("/>");
                    return;
                }
                let children = self.children(id);
                if children.is_empty() && element.self_closing {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(&element.name);
                out.push('>');
            }
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::CData(text) => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Declaration(text) | NodeKind::ProcessingInstruction(text) => {
                out.push_str("<?");
                out.push_str(text);
                out.push_str("?>");
            }
            NodeKind::Doctype(text) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(text.trim_start());
                out.push('>');
            }
        }
    }

    fn append_new(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.create(kind);
        self.append_child(parent, id);
        id
    }

    // Adjacent text and entity references collapse into one raw text node.
    fn push_text(&mut self, parent: NodeId, raw: &str) {
        if let Some(last) = self.children(parent).last().copied() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(raw);
                return;
            }
        }
        self.append_new(parent, NodeKind::Text(raw.to_string()));
    }

    fn mark_self_closing(&mut self, id: NodeId) {
        if let Some(element) = self.element_mut(id) {
            element.self_closing = true;
        }
    }
}

/// Whether a local element name is an HTML void element.
pub fn is_void_element(local_name: &str) -> bool {
    VOID_ELEMENTS
        .iter()
        .any(|void| void.eq_ignore_ascii_case(local_name))
}

/// Escapes `<` that cannot open markup and `&` that does not start a
/// reference, in text and in quoted attribute values. Comments, CDATA,
/// processing instructions and doctypes are copied unchanged.
fn escape_stray_delimiters(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(position) = rest.find(['<', '&']) {
        out.push_str(&rest[..position]);
        rest = &rest[position..];

        if rest.starts_with('&') {
            let len = reference_len(rest);
            if len == 0 {
                out.push_str("&amp;");
                rest = &rest[1..];
            } else {
                out.push_str(&rest[..len]);
                rest = &rest[len..];
            }
            continue;
        }

        let section = if rest.starts_with("<!--") {
            Some("-->")
        } else if rest.starts_with("<![CDATA[") {
            Some("]]>")
        } else if rest.starts_with("<?") {
            Some("?>")
        } else if rest.starts_with("<!") {
            Some(">")
        } else {
            None
        };
        if let Some(terminator) = section {
            let end = rest
                .find(terminator)
                .map_or(rest.len(), |found| found + terminator.len());
            out.push_str(&rest[..end]);
            rest = &rest[end..];
            continue;
        }

        match tag_len(rest) {
            Some(len) => {
                push_tag(&mut out, &rest[..len]);
                rest = &rest[len..];
            }
            None => {
                out.push_str("&lt;");
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Length of the reference at the start of `text`, or 0 if there is none.
fn reference_len(text: &str) -> usize {
    REFERENCE_REGEX.find(text).map_or(0, |found| found.end())
}

/// Length of the start or end tag at the start of `text`, up to and
/// including its `>`. `None` when the `<` is not followed by a name, or when
/// another `<` or the end of input comes before the tag closes.
fn tag_len(text: &str) -> Option<usize> {
    let after = &text[1..];
    let name = after.strip_prefix('/').unwrap_or(after);
    if !name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == ':')
    {
        return None;
    }

    let mut quote = None;
    for (index, c) in text.char_indices().skip(1) {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(index + 1),
            (None, '<') => return None,
            _ => {}
        }
    }
    None
}

fn push_tag(out: &mut String, tag: &str) {
    let mut quote = None;
    let mut rest = tag;
    while let Some(c) = rest.chars().next() {
        let width = c.len_utf8();
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), '<') => {
                out.push_str("&lt;");
                rest = &rest[width..];
                continue;
            }
            (Some(_), '&') if reference_len(rest) == 0 => {
                out.push_str("&amp;");
                rest = &rest[width..];
                continue;
            }
            (None, '"' | '\'') => quote = Some(c),
            _ => {}
        }
        out.push(c);
        rest = &rest[width..];
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

fn element_from_start(e: &BytesStart<'_>, self_closing: bool) -> Result<Element, DocumentError> {
    let mut element = Element::new(decode_utf8(e.name().as_ref())?);
    element.self_closing = self_closing;
    for attr in e.html_attributes().with_checks(false) {
        let attr = attr.map_err(|err| DocumentError::Parse(format!("Attr error: {:?}", err)))?;
        element.attributes.push(Attribute {
            key: decode_utf8(attr.key.as_ref())?,
            value: decode_utf8(&attr.value)?,
        });
    }
    Ok(element)
}

fn decode_utf8(bytes: &[u8]) -> Result<String, DocumentError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| DocumentError::Parse(format!("Decode error: {:?}", err)))
}

// HTML named entities such as `&nbsp;` are not known to the XML unescaper;
// they are kept verbatim rather than failing the read.
fn unescape_lossy(raw: &str) -> String {
    quick_xml::escape::unescape(raw)
        .map(|text| text.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
