//! # Markup Tree
//!
//! Parses the HTML-like block markup into an element tree and provides the
//! handful of DOM operations the table engine needs: find by tag or id,
//! deep clone, append, remove, and the content mutators used when the
//! template row is materialized into data rows.
//!
//! The parser accepts well-formed XML-ish markup (`<p>`, `<h1>`-`<h3>`,
//! `<b>`, `<i>`, `<span>`, `<br/>`, `<img/>`, `<table>`/`<tr>`/`<td>`).
//! Bare `<br>` is normalized before parsing. Unknown tags are kept in the
//! tree and flow as plain containers.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{ReportError, Result};
use crate::style::{Color, Style};

/// A node in the markup tree: an element or a run of text.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Element(Element),
    Text(String),
}

/// A markup element with its attributes and parsed inline style.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub attrs: Vec<(String, String)>,
    /// Parsed from the inline `style` attribute at parse time.
    pub style: Style,
    pub children: Vec<MarkupNode>,
}

impl Element {
    pub fn new(tag: &str) -> Element {
        Element {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Depth-first search for the first element matching `tag` and/or `id`.
    /// `None` criteria match anything; the element itself is a candidate.
    pub fn find(&self, tag: Option<&str>, id: Option<&str>) -> Option<&Element> {
        if self.matches(tag, id) {
            return Some(self);
        }
        for child in &self.children {
            if let MarkupNode::Element(el) = child {
                if let Some(found) = el.find(tag, id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Mutable counterpart of [`find`](Self::find).
    pub fn find_mut(&mut self, tag: Option<&str>, id: Option<&str>) -> Option<&mut Element> {
        if self.matches(tag, id) {
            return Some(self);
        }
        for child in &mut self.children {
            if let MarkupNode::Element(el) = child {
                if let Some(found) = el.find_mut(tag, id) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn matches(&self, tag: Option<&str>, id: Option<&str>) -> bool {
        let tag_ok = tag.map_or(true, |t| self.tag == t);
        let id_ok = id.map_or(true, |i| self.id.as_deref() == Some(i));
        tag_ok && id_ok && (tag.is_some() || id.is_some())
    }

    pub fn append_child(&mut self, el: Element) {
        self.children.push(MarkupNode::Element(el));
    }

    /// Remove the first descendant element with the given id. Returns
    /// whether anything was removed.
    pub fn remove_by_id(&mut self, id: &str) -> bool {
        let before = self.children.len();
        self.children.retain(|c| {
            !matches!(c, MarkupNode::Element(el) if el.id.as_deref() == Some(id))
        });
        if self.children.len() != before {
            return true;
        }
        for child in &mut self.children {
            if let MarkupNode::Element(el) = child {
                if el.remove_by_id(id) {
                    return true;
                }
            }
        }
        false
    }

    /// Set the background color on this element's style.
    pub fn set_background(&mut self, color: Color) {
        self.style.background_color = Some(color);
    }

    /// Append a text run. Newlines inside the text become hard line breaks
    /// during flow layout.
    pub fn add_text(&mut self, text: &str) {
        self.children.push(MarkupNode::Text(text.to_string()));
    }

    /// Append an `<img>` child referencing `src`.
    pub fn add_image(&mut self, src: &str) {
        let mut img = Element::new("img");
        img.attrs.push(("src".to_string(), src.to_string()));
        self.children.push(MarkupNode::Element(img));
    }

    /// Concatenated text content of this subtree.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                MarkupNode::Text(t) => out.push_str(t),
                MarkupNode::Element(el) => {
                    if el.tag == "br" {
                        out.push('\n');
                    } else {
                        out.push_str(&el.text_content());
                    }
                }
            }
        }
        out
    }
}

/// Parse markup into a synthetic `body` root element.
pub fn parse(markup: &str) -> Result<Element> {
    // Bare HTML void tags are normalized to self-closing form; the examples
    // the engine consumes are otherwise well-formed.
    let normalized = markup.replace("<br>", "<br/>").replace("<hr>", "<hr/>");

    let mut reader = Reader::from_str(&normalized);
    let mut stack: Vec<Element> = vec![Element::new("body")];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(element_from_start(&e));
            }
            Ok(Event::Empty(e)) => {
                let el = element_from_start(&e);
                push_child(&mut stack, el)?;
            }
            Ok(Event::End(_)) => {
                // The synthetic body root is never popped by markup.
                if stack.len() > 1 {
                    let el = stack.pop().expect("stack underflow");
                    push_child(&mut stack, el)?;
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| ReportError::Markup(e.to_string()))?
                    .to_string();
                if !text.trim().is_empty() {
                    let top = stack.last_mut().expect("stack underflow");
                    top.children.push(MarkupNode::Text(collapse_whitespace(&text)));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ReportError::Markup(e.to_string())),
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(ReportError::Markup("unclosed element in markup".to_string()));
    }
    let mut body = stack.pop().expect("body root");
    // A top-level <body> or <html> wrapper collapses into the synthetic root.
    if body.children.len() == 1 {
        if let MarkupNode::Element(el) = &body.children[0] {
            if el.tag == "body" || el.tag == "html" {
                let MarkupNode::Element(inner) = body.children.remove(0) else {
                    unreachable!()
                };
                body = inner;
                body.tag = "body".to_string();
            }
        }
    }
    Ok(body)
}

fn element_from_start(e: &quick_xml::events::BytesStart) -> Element {
    let tag = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
    let mut el = Element::new(&tag);
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = attr
            .unescape_value()
            .map(|v| v.to_string())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string());
        match key.as_str() {
            "id" => el.id = Some(value),
            "style" => el.style = Style::from_declarations(&value),
            "bgcolor" => el.style.background_color = Color::parse(&value),
            _ => el.attrs.push((key, value)),
        }
    }
    el
}

fn push_child(stack: &mut Vec<Element>, el: Element) -> Result<()> {
    let top = stack
        .last_mut()
        .ok_or_else(|| ReportError::Markup("unbalanced markup".to_string()))?;
    top.children.push(MarkupNode::Element(el));
    Ok(())
}

/// Collapse runs of whitespace to single spaces, preserving explicit
/// newlines which mark hard breaks.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch == '\n' {
            out.push('\n');
            in_space = true;
        } else if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}
