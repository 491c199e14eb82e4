//! Tolerant XML tree shared by the classifier and the feed parsers.
//!
//! Feeds in the wild are rarely well-formed. The builder here never fails:
//! an end tag closes every element opened after its matching start tag, an
//! end tag with nothing to match is dropped, and a syntax error or EOF stops
//! the read and leaves whatever is still open marked as unterminated.
//! Elements closed only because an ancestor's end tag arrived first are
//! unterminated too.
//!
//! Names and attribute keys keep their original spelling; all lookups are
//! ASCII case-insensitive.

use std::fmt::Write as _;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// SEC-003: Maximum element nesting depth. Reading stops past this point so
/// that the recursive helpers below stay bounded.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, Default)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
    terminated: bool,
}

impl Element {
    fn from_start(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();

        for attr_result in start.attributes().with_checks(false) {
            let attr = match attr_result {
                Ok(attr) => attr,
                Err(e) => {
                    tracing::debug!(element = %name, error = %e, "Skipping malformed attribute");
                    continue;
                }
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.decode_and_unescape_value(reader.decoder()) {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attributes.push((key, value));
        }

        Self {
            name,
            attributes,
            children: Vec::new(),
            terminated: false,
        }
    }

    /// Qualified name as written in the document (e.g. `atom:link`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name with any namespace prefix removed.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Matches either the qualified or the local name, ignoring case.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.local_name().eq_ignore_ascii_case(name)
    }

    /// False when this element's own end tag never arrived: the document
    /// ended or broke first, or an ancestor's end tag closed it.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// All descendant elements in document (pre-)order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.child_elements().collect::<Vec<_>>().into_iter().rev().collect(),
            boundary: None,
        }
    }

    /// Like [`Element::descendants`], but never enters a nested element with
    /// the same local name as `self`. An `<item>` swallowed by an unclosed
    /// sibling keeps its own fields.
    fn scoped_descendants(&self) -> Descendants<'_> {
        let local = self.local_name();
        Descendants {
            boundary: (!local.is_empty()).then_some(local),
            ..self.descendants()
        }
    }

    /// First element called `name`.
    ///
    /// Direct children win over deeper descendants, and an exact qualified
    /// name wins over a prefixed one, so `<link>` is preferred to
    /// `<atom:link>`. Deeper matches are the recovery path for items whose
    /// fields ended up nested under an unclosed sibling; they never come
    /// from inside a nested element of the same kind as `self`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.child_elements()
            .find(|el| el.name.eq_ignore_ascii_case(name))
            .or_else(|| self.child_elements().find(|el| el.is_named(name)))
            .or_else(|| {
                self.scoped_descendants()
                    .find(|el| el.name.eq_ignore_ascii_case(name))
            })
            .or_else(|| self.scoped_descendants().find(|el| el.is_named(name)))
    }

    /// Every element called `name`, direct children first; falls back to
    /// the scoped descendants when no direct child matches.
    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        let direct: Vec<&Element> = self.child_elements().filter(|el| el.is_named(name)).collect();
        if !direct.is_empty() {
            return direct;
        }
        self.scoped_descendants().filter(|el| el.is_named(name)).collect()
    }

    /// Text of the direct text children only, trimmed. Unlike
    /// [`Element::text`], markup swallowed by an unclosed tag is not
    /// appended.
    pub fn own_text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let Node::Text(text) = child {
                out.push_str(text);
            }
        }
        out.trim().to_owned()
    }

    /// Concatenated text of every descendant text node, trimmed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out.trim().to_owned()
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }

    /// Children re-serialized as markup. Text nodes are emitted decoded, so
    /// escaped or CDATA-wrapped HTML comes out as HTML.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        self.write_children(&mut out);
        out.trim().to_owned()
    }

    fn write_children(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => {
                    out.push('<');
                    out.push_str(&el.name);
                    for (key, value) in &el.attributes {
                        let _ = write!(out, " {}=\"{}\"", key, quick_xml::escape::escape(value));
                    }
                    if el.children.is_empty() {
                        out.push_str("/>");
                    } else {
                        out.push('>');
                        el.write_children(out);
                        out.push_str("</");
                        out.push_str(&el.name);
                        out.push('>');
                    }
                }
            }
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
    /// Local name whose subtrees are skipped entirely.
    boundary: Option<&'a str>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = self.stack.pop()?;
            if self
                .boundary
                .is_some_and(|name| next.local_name().eq_ignore_ascii_case(name))
            {
                continue;
            }
            let before = self.stack.len();
            self.stack.extend(next.child_elements());
            self.stack[before..].reverse();
            return Some(next);
        }
    }
}

/// A parsed document. The root is a synthetic, unnamed element holding the
/// top-level nodes.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
    syntax_error: Option<String>,
}

impl Document {
    pub fn parse(content: &str) -> Self {
        let mut reader = Reader::from_str(content);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut stack = vec![Element {
            terminated: true,
            ..Element::default()
        }];
        let mut buf = Vec::new();
        let mut syntax_error = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    if stack.len() > MAX_DEPTH {
                        syntax_error = Some(format!("nesting deeper than {} levels", MAX_DEPTH));
                        break;
                    }
                    stack.push(Element::from_start(&e, &reader));
                }
                Ok(Event::Empty(e)) => {
                    let mut el = Element::from_start(&e, &reader);
                    el.terminated = true;
                    push_child(&mut stack, Node::Element(el));
                }
                Ok(Event::End(e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    close_element(&mut stack, &name);
                }
                Ok(Event::Text(e)) => {
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        // Unknown entities (&nbsp; and friends) are kept verbatim
                        Err(_) => String::from_utf8_lossy(&e).into_owned(),
                    };
                    if !text.trim().is_empty() {
                        push_child(&mut stack, Node::Text(text));
                    }
                }
                Ok(Event::CData(e)) => {
                    let text = String::from_utf8_lossy(&e).into_owned();
                    push_child(&mut stack, Node::Text(text));
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    tracing::debug!(
                        position = reader.error_position(),
                        error = %e,
                        "Stopping XML read at syntax error"
                    );
                    syntax_error = Some(e.to_string());
                    break;
                }
                _ => {}
            }
            buf.clear();
        }

        // Anything still open never saw its end tag
        while stack.len() > 1 {
            if let Some(el) = stack.pop() {
                push_child(&mut stack, Node::Element(el));
            }
        }

        let root = stack.pop().unwrap_or_default();
        Self { root, syntax_error }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// The error that stopped reading early, if any.
    pub fn syntax_error(&self) -> Option<&str> {
        self.syntax_error.as_deref()
    }
}

fn push_child(stack: &mut [Element], node: Node) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

fn close_element(stack: &mut Vec<Element>, name: &str) {
    // Index 0 is the synthetic root and never closes
    let Some(position) = stack
        .iter()
        .skip(1)
        .rposition(|el| el.name.eq_ignore_ascii_case(name))
        .map(|p| p + 1)
    else {
        tracing::debug!(tag = %name, "Ignoring unmatched end tag");
        return;
    };

    // Elements above the match never saw their own end tag and stay
    // unterminated
    while stack.len() > position + 1 {
        if let Some(el) = stack.pop() {
            push_child(stack, Node::Element(el));
        }
    }
    if let Some(mut el) = stack.pop() {
        el.terminated = true;
        push_child(stack, Node::Element(el));
    }
}
