//! In-memory document
//!
//! A [`Document`] owns the package plus parsed trees for the main
//! document part, header parts and footer parts. The body (`w:body`) is
//! kept apart from the root so block-level edits do not need to re-find
//! it. Serialization puts everything back on [`Document::save`].

use std::path::Path;

use tracing::{debug, warn};

use crate::blank;
use crate::errors::DocxError;
use crate::package::Package;
use crate::paragraph::{self, PARAGRAPH};
use crate::xml::{XmlElement, XmlNode};

const BODY: &str = "w:body";
const SECTION_PROPS: &str = "w:sectPr";
pub const TABLE: &str = "w:tbl";

/// A loaded document
#[derive(Debug, Clone)]
pub struct Document {
    package: Package,
    main_part: String,
    /// Root element with the body removed
    root: XmlElement,
    body_index: usize,
    body: XmlElement,
    headers: Vec<(String, XmlElement)>,
    footers: Vec<(String, XmlElement)>,
}

impl Document {
    /// Open a `.docx` file
    pub fn open(path: &Path) -> Result<Self, DocxError> {
        Self::from_package(Package::open(path)?)
    }

    /// Load a `.docx` from memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocxError> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    /// A minimal empty document
    pub fn blank() -> Result<Self, DocxError> {
        Self::from_package(blank::package())
    }

    /// Open `path`, falling back to a blank document when it cannot be
    /// read. The flag is true when the fallback was used.
    pub fn open_or_blank(path: Option<&Path>) -> Result<(Self, bool), DocxError> {
        if let Some(path) = path {
            match Self::open(path) {
                Ok(doc) => return Ok((doc, false)),
                Err(e) => warn!(
                    "Could not open template {}: {}; using a blank document",
                    path.display(),
                    e
                ),
            }
        }
        Ok((Self::blank()?, true))
    }

    pub fn from_package(package: Package) -> Result<Self, DocxError> {
        let main_part = package.main_document_part();
        let mut root = package.xml_part(&main_part)?;

        let body_index = root
            .children
            .iter()
            .position(|node| matches!(node, XmlNode::Element(el) if el.name == BODY));
        let (body_index, body) = match body_index {
            Some(index) => match root.children.remove(index) {
                XmlNode::Element(body) => (index, body),
                XmlNode::Text(_) => unreachable!("position matched an element"),
            },
            None => (root.children.len(), XmlElement::new(BODY)),
        };

        let mut headers = Vec::new();
        let mut footers = Vec::new();
        for name in package.part_names() {
            if is_story_part(name, "header") {
                headers.push((name.to_string(), package.xml_part(name)?));
            } else if is_story_part(name, "footer") {
                footers.push((name.to_string(), package.xml_part(name)?));
            }
        }

        debug!(
            "Loaded document part {} ({} headers, {} footers)",
            main_part,
            headers.len(),
            footers.len()
        );

        Ok(Self {
            package,
            main_part,
            root,
            body_index,
            body,
            headers,
            footers,
        })
    }

    /// Serialize every parsed part back into the package
    fn sync_package(&mut self) -> Result<(), DocxError> {
        let mut root = self.root.clone();
        let index = self.body_index.min(root.children.len());
        root.children
            .insert(index, XmlNode::Element(self.body.clone()));
        self.package.set_xml_part(&self.main_part.clone(), &root)?;

        for (name, part) in self.headers.iter().chain(self.footers.iter()) {
            self.package.set_xml_part(name, part)?;
        }
        Ok(())
    }

    /// Write the document as `.docx` bytes
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, DocxError> {
        self.sync_package()?;
        self.package.to_bytes()
    }

    /// Write the document to `path`
    pub fn save(&mut self, path: &Path) -> Result<(), DocxError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn main_part(&self) -> &str {
        &self.main_part
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn package_mut(&mut self) -> &mut Package {
        &mut self.package
    }

    /// Root element of the main part (without its body)
    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    pub fn body(&self) -> &XmlElement {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut XmlElement {
        &mut self.body
    }

    /// Visit every paragraph: body (including table cells), headers, footers
    pub fn for_each_paragraph_mut(&mut self, f: &mut dyn FnMut(&mut XmlElement)) {
        self.body.for_each_descendant_mut(PARAGRAPH, f);
        for (_, part) in self.headers.iter_mut().chain(self.footers.iter_mut()) {
            part.for_each_descendant_mut(PARAGRAPH, f);
        }
    }

    /// Text of every paragraph (body, tables, headers, footers), in order
    pub fn paragraph_texts(&self) -> Vec<String> {
        let mut texts: Vec<String> = self
            .body
            .descendants(PARAGRAPH)
            .into_iter()
            .map(paragraph::text)
            .collect();
        for (_, part) in self.headers.iter().chain(self.footers.iter()) {
            texts.extend(part.descendants(PARAGRAPH).into_iter().map(paragraph::text));
        }
        texts
    }

    /// All paragraph text joined by newlines
    pub fn full_text(&self) -> String {
        self.paragraph_texts().join("\n")
    }

    /// Body-level tables
    pub fn tables(&self) -> Vec<&XmlElement> {
        self.body.elements().filter(|el| el.name == TABLE).collect()
    }

    /// Index (into the body's children) of the first body-level
    /// paragraph whose text contains `marker`
    pub fn find_paragraph(&self, marker: &str) -> Option<usize> {
        self.body.children.iter().position(|node| match node {
            XmlNode::Element(el) if el.name == PARAGRAPH => paragraph::text(el).contains(marker),
            _ => false,
        })
    }

    /// Indices of every body-level paragraph whose text contains `marker`,
    /// in document order
    pub fn find_paragraphs(&self, marker: &str) -> Vec<usize> {
        self.body
            .children
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                XmlNode::Element(el)
                    if el.name == PARAGRAPH && paragraph::text(el).contains(marker) =>
                {
                    Some(index)
                }
                _ => None,
            })
            .collect()
    }

    /// Body-level paragraph at `index`
    pub fn paragraph_at_mut(&mut self, index: usize) -> Option<&mut XmlElement> {
        match self.body.children.get_mut(index) {
            Some(XmlNode::Element(el)) if el.name == PARAGRAPH => Some(el),
            _ => None,
        }
    }

    /// Insert block elements before body child `index`
    pub fn insert_blocks(&mut self, index: usize, blocks: Vec<XmlElement>) {
        let index = index.min(self.body.children.len());
        self.body
            .children
            .splice(index..index, blocks.into_iter().map(XmlNode::Element));
    }

    /// Remove the body child at `index`
    pub fn remove_block(&mut self, index: usize) -> Option<XmlElement> {
        if index >= self.body.children.len() {
            return None;
        }
        match self.body.children.remove(index) {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        }
    }

    /// Append a block at the end of the body, before the final section
    /// properties
    pub fn append_block(&mut self, block: XmlElement) {
        let index = self
            .body
            .children
            .iter()
            .rposition(|node| matches!(node, XmlNode::Element(el) if el.name == SECTION_PROPS))
            .unwrap_or(self.body.children.len());
        self.insert_blocks(index, vec![block]);
    }

    /// Append a plain paragraph
    pub fn append_paragraph(&mut self, text: &str) {
        self.append_block(paragraph::text_paragraph(text, None, None));
    }

    /// Ensure a namespace prefix is declared on the main part root
    pub fn ensure_namespace(&mut self, prefix: &str, uri: &str) {
        let key = format!("xmlns:{}", prefix);
        if self.root.attr(&key).is_none() {
            self.root.set_attr(key, uri);
        }
    }
}

fn is_story_part(name: &str, kind: &str) -> bool {
    name.strip_prefix("word/")
        .and_then(|rest| rest.strip_prefix(kind))
        .map(|rest| {
            rest.ends_with(".xml")
                && !rest.contains('/')
                && rest
                    .trim_end_matches(".xml")
                    .chars()
                    .all(|c| c.is_ascii_digit())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blank_document_has_empty_body() {
        let doc = Document::blank().unwrap();
        assert_eq!(doc.main_part(), "word/document.xml");
        assert!(doc.paragraph_texts().is_empty());
        assert!(doc.body().child("w:sectPr").is_some());
    }

    #[test]
    fn test_append_paragraph_goes_before_section_properties() {
        let mut doc = Document::blank().unwrap();
        doc.append_paragraph("first");
        doc.append_paragraph("second");

        let names: Vec<&str> = doc.body().elements().map(|el| el.name.as_str()).collect();
        assert_eq!(names, vec!["w:p", "w:p", "w:sectPr"]);
        assert_eq!(doc.paragraph_texts(), vec!["first", "second"]);
    }

    #[test]
    fn test_save_and_reload_preserves_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");

        let mut doc = Document::blank().unwrap();
        doc.append_paragraph("Report for Acme Farm in Devon");
        doc.save(&path).unwrap();

        let reloaded = Document::open(&path).unwrap();
        assert_eq!(reloaded.paragraph_texts(), vec!["Report for Acme Farm in Devon"]);
    }

    #[test]
    fn test_open_or_blank_falls_back_on_bad_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, b"not a zip").unwrap();

        let (doc, fell_back) = Document::open_or_blank(Some(&path)).unwrap();
        assert!(fell_back);
        assert!(doc.paragraph_texts().is_empty());

        let (_, fell_back) = Document::open_or_blank(None).unwrap();
        assert!(fell_back);
    }

    #[test]
    fn test_find_and_remove_paragraph() {
        let mut doc = Document::blank().unwrap();
        doc.append_paragraph("intro");
        doc.append_paragraph("[[table-7_monitoring]]");

        let index = doc.find_paragraph("[[table-7_monitoring]]").unwrap();
        let removed = doc.remove_block(index).unwrap();
        assert_eq!(paragraph::text(&removed), "[[table-7_monitoring]]");
        assert_eq!(doc.find_paragraph("[[table-7_monitoring]]"), None);
    }

    #[test]
    fn test_is_story_part() {
        assert!(is_story_part("word/header1.xml", "header"));
        assert!(is_story_part("word/footer.xml", "footer"));
        assert!(!is_story_part("word/_rels/header1.xml.rels", "header"));
        assert!(!is_story_part("word/headerfoo.xml", "header"));
    }
}
