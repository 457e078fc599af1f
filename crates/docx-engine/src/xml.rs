//! Lossless XML element tree for package parts
//!
//! Parts are parsed into owned [`XmlElement`] trees with qualified names
//! kept verbatim (`w:p`, `w:tbl`, ...). Elements the engine does not
//! understand survive a load/save cycle untouched.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::errors::DocxError;

/// A node in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with its attributes and children in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder: add an attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder: add a child element
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Builder: add a text child
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Child elements, skipping text nodes
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|el| el.name == name)
    }

    /// Direct child with the given name, created (appended) when missing
    pub fn child_or_insert(&mut self, name: &str) -> &mut XmlElement {
        let index = match self.children.iter().position(|node| is_named(node, name)) {
            Some(index) => index,
            None => {
                self.children.push(XmlNode::Element(XmlElement::new(name)));
                self.children.len() - 1
            }
        };
        match &mut self.children[index] {
            XmlNode::Element(el) => el,
            XmlNode::Text(_) => unreachable!("position matched an element"),
        }
    }

    /// Remove every direct child with the given name
    pub fn remove_children(&mut self, name: &str) {
        self.children.retain(|node| !is_named(node, name));
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Replace all children with a single text node
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }

    /// All descendants named `name`, in document order.
    ///
    /// Matching elements are not searched further.
    pub fn descendants(&self, name: &str) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        collect_named(self, name, &mut found);
        found
    }

    /// Visit every descendant named `name` mutably, in document order.
    ///
    /// Matching elements are not searched further.
    pub fn for_each_descendant_mut(&mut self, name: &str, f: &mut dyn FnMut(&mut XmlElement)) {
        for child in self.children.iter_mut() {
            if let XmlNode::Element(el) = child {
                if el.name == name {
                    f(el);
                } else {
                    el.for_each_descendant_mut(name, f);
                }
            }
        }
    }
}

fn is_named(node: &XmlNode, name: &str) -> bool {
    matches!(node, XmlNode::Element(el) if el.name == name)
}

fn collect_text(el: &XmlElement, out: &mut String) {
    for child in &el.children {
        match child {
            XmlNode::Text(text) => out.push_str(text),
            XmlNode::Element(inner) => collect_text(inner, out),
        }
    }
}

fn collect_named<'a>(el: &'a XmlElement, name: &str, found: &mut Vec<&'a XmlElement>) {
    for child in el.elements() {
        if child.name == name {
            found.push(child);
        } else {
            collect_named(child, name, found);
        }
    }
}

/// Parse a package part into its root element
pub fn parse(part: &str, bytes: &[u8]) -> Result<XmlElement, DocxError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| DocxError::xml(part, e))?;

        match event {
            Event::Start(start) => stack.push(element_from_start(part, &start)?),
            Event::Empty(start) => {
                let el = element_from_start(part, &start)?;
                attach(&mut stack, &mut root, el);
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| DocxError::xml(part, "unbalanced end tag"))?;
                attach(&mut stack, &mut root, el);
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let value = text.unescape().map_err(|e| DocxError::xml(part, e))?;
                    if !value.is_empty() {
                        top.children.push(XmlNode::Text(value.into_owned()));
                    }
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    top.children.push(XmlNode::Text(value));
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and doctypes
            // are regenerated or dropped on save.
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(DocxError::xml(part, "unexpected end of document"));
    }
    root.ok_or_else(|| DocxError::xml(part, "document has no root element"))
}

fn element_from_start(part: &str, start: &BytesStart<'_>) -> Result<XmlElement, DocxError> {
    let mut el = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocxError::xml(part, e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DocxError::xml(part, e))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None => *root = Some(el),
    }
}

/// Serialize a root element as a standalone part
pub fn to_bytes(part: &str, root: &XmlElement) -> Result<Vec<u8>, DocxError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(|e| DocxError::xml(part, e))?;
    write_element(part, &mut writer, root)?;
    Ok(writer.into_inner().into_inner())
}

fn write_element(
    part: &str,
    writer: &mut Writer<Cursor<Vec<u8>>>,
    el: &XmlElement,
) -> Result<(), DocxError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if el.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| DocxError::xml(part, e));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| DocxError::xml(part, e))?;
    for child in &el.children {
        match child {
            XmlNode::Element(inner) => write_element(part, writer, inner)?,
            XmlNode::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| DocxError::xml(part, e))?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .map_err(|e| DocxError::xml(part, e))
}
