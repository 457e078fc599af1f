//! Paragraph (`w:p`) helpers: text extraction, marker replacement and
//! construction of new paragraphs and runs

use crate::xml::XmlElement;

pub const PARAGRAPH: &str = "w:p";
pub const RUN: &str = "w:r";
pub const TEXT: &str = "w:t";
pub const PARAGRAPH_PROPS: &str = "w:pPr";
pub const RUN_PROPS: &str = "w:rPr";

/// Visible text of a paragraph (concatenated `w:t` content)
pub fn text(p: &XmlElement) -> String {
    p.descendants(TEXT)
        .into_iter()
        .map(XmlElement::text_content)
        .collect()
}

/// Replace every occurrence of `marker` in the paragraph.
///
/// Occurrences inside a single run are replaced in place. When a marker is
/// split across runs, the paragraph text is merged into its first text
/// element (keeping that run's formatting) and replaced there.
///
/// Returns the number of occurrences replaced.
pub fn replace_text(p: &mut XmlElement, marker: &str, value: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }

    let original = text(p);
    let total = original.matches(marker).count();
    if total == 0 {
        return 0;
    }

    p.for_each_descendant_mut(TEXT, &mut |t| {
        let current = t.text_content();
        if current.contains(marker) {
            set_text_element(t, &current.replace(marker, value));
        }
    });

    if text(p).contains(marker) {
        let merged = original.replace(marker, value);
        set_text(p, &merged);
    }

    total
}

/// Put `value` into the first text element and clear the others
pub fn set_text(p: &mut XmlElement, value: &str) {
    let mut first = true;
    p.for_each_descendant_mut(TEXT, &mut |t| {
        if first {
            set_text_element(t, value);
            first = false;
        } else {
            set_text_element(t, "");
        }
    });

    if first {
        // No text element yet
        p.push(run(value, None));
    }
}

fn set_text_element(t: &mut XmlElement, value: &str) {
    t.set_text(value);
    t.set_attr("xml:space", "preserve");
}

/// Paragraph properties (`w:pPr`), cloned
pub fn properties(p: &XmlElement) -> Option<XmlElement> {
    p.child(PARAGRAPH_PROPS).cloned()
}

/// Run properties of the first run carrying text, cloned
pub fn first_run_properties(p: &XmlElement) -> Option<XmlElement> {
    p.descendants(RUN)
        .into_iter()
        .find(|r| r.child(TEXT).is_some())
        .and_then(|r| r.child(RUN_PROPS))
        .cloned()
}

/// A new empty paragraph with optional properties
pub fn new_paragraph(props: Option<XmlElement>) -> XmlElement {
    let mut p = XmlElement::new(PARAGRAPH);
    if let Some(props) = props {
        p.push(props);
    }
    p
}

/// A paragraph holding one run of text
pub fn text_paragraph(value: &str, props: Option<XmlElement>, run_props: Option<&XmlElement>) -> XmlElement {
    let mut p = new_paragraph(props);
    p.push(run(value, run_props));
    p
}

/// A run of text with optional run properties
pub fn run(value: &str, run_props: Option<&XmlElement>) -> XmlElement {
    let mut r = XmlElement::new(RUN);
    if let Some(props) = run_props {
        r.push(props.clone());
    }
    r.push(
        XmlElement::new(TEXT)
            .with_attr("xml:space", "preserve")
            .with_text(value),
    );
    r
}

/// A run whose properties are `base` plus bold
pub fn bold_run(value: &str, base: Option<&XmlElement>) -> XmlElement {
    let mut props = base.cloned().unwrap_or_else(|| XmlElement::new(RUN_PROPS));
    props.child_or_insert("w:b");
    run(value, Some(&props))
}

/// Set the paragraph style (`w:pStyle`), creating `w:pPr` if needed
pub fn set_style(p: &mut XmlElement, style_id: &str) {
    if p.child(PARAGRAPH_PROPS).is_none() {
        p.children
            .insert(0, crate::xml::XmlNode::Element(XmlElement::new(PARAGRAPH_PROPS)));
    }
    if let Some(props) = p.child_mut(PARAGRAPH_PROPS) {
        props.remove_children("w:pStyle");
        // pStyle is the first child of pPr
        props.children.insert(
            0,
            crate::xml::XmlNode::Element(XmlElement::new("w:pStyle").with_attr("w:val", style_id)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn split_paragraph() -> XmlElement {
        // "Report for [[client_name]]" with the marker split over three runs
        let bold = XmlElement::new(RUN_PROPS).with_child(XmlElement::new("w:b"));
        let mut p = new_paragraph(None);
        p.push(run("Report for [[client", Some(&bold)));
        p.push(run("_na", None));
        p.push(run("me]]", None));
        p
    }

    #[test]
    fn test_text_concatenates_runs() {
        assert_eq!(text(&split_paragraph()), "Report for [[client_name]]");
    }

    #[test]
    fn test_replace_within_single_run_keeps_runs() {
        let mut p = new_paragraph(None);
        p.push(run("Hello ", None));
        p.push(run("[[name]] and [[name]]", None));

        assert_eq!(replace_text(&mut p, "[[name]]", "Devon"), 2);
        assert_eq!(text(&p), "Hello Devon and Devon");
        assert_eq!(p.descendants(RUN).len(), 2);
    }

    #[test]
    fn test_replace_split_marker_merges_into_first_run() {
        let mut p = split_paragraph();
        assert_eq!(replace_text(&mut p, "[[client_name]]", "Acme Farm"), 1);
        assert_eq!(text(&p), "Report for Acme Farm");

        let runs = p.descendants(RUN);
        assert_eq!(runs[0].child(TEXT).unwrap().text_content(), "Report for Acme Farm");
        assert!(runs[0].child(RUN_PROPS).unwrap().child("w:b").is_some());
    }

    #[test]
    fn test_replace_missing_marker_is_noop() {
        let mut p = split_paragraph();
        let before = p.clone();
        assert_eq!(replace_text(&mut p, "[[other]]", "x"), 0);
        assert_eq!(p, before);
    }

    #[test]
    fn test_set_style_replaces_existing_style() {
        let mut p = text_paragraph("item", None, None);
        set_style(&mut p, "ListBullet");
        set_style(&mut p, "Heading1");
        let props = p.child(PARAGRAPH_PROPS).unwrap();
        let styles: Vec<_> = props
            .elements()
            .filter(|el| el.name == "w:pStyle")
            .collect();
        assert_eq!(styles.len(), 1);
        assert_eq!(styles[0].attr("w:val"), Some("Heading1"));
    }

    #[test]
    fn test_bold_run_adds_bold_once() {
        let base = XmlElement::new(RUN_PROPS).with_child(XmlElement::new("w:b"));
        let r = bold_run("x", Some(&base));
        let props = r.child(RUN_PROPS).unwrap();
        assert_eq!(props.elements().filter(|el| el.name == "w:b").count(), 1);
    }
}
