//! Placeholder substitution pass
//!
//! Scans every paragraph of the document (body, table cells, headers and
//! footers) for exact marker strings and replaces them. Matching is plain
//! substring replacement; markers that appear in the mapping but not in
//! the document are reported, never treated as errors.

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::document::Document;
use crate::paragraph;

lazy_static! {
    static ref MARKER: Regex = Regex::new(r"\[\[[^\[\]]+\]\]").unwrap();
}

/// Which markers were found (with occurrence counts) and which were not
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubstitutionReport {
    pub found: BTreeMap<String, usize>,
    pub missing: BTreeSet<String>,
}

impl SubstitutionReport {
    /// Total number of replacements made
    pub fn replacements(&self) -> usize {
        self.found.values().sum()
    }

    pub fn merge(&mut self, other: SubstitutionReport) {
        for (marker, count) in other.found {
            *self.found.entry(marker).or_insert(0) += count;
        }
        self.missing.extend(other.missing);
        let found = &self.found;
        self.missing.retain(|marker| !found.contains_key(marker));
    }
}

/// Replace every occurrence of each mapped marker in the document
pub fn replace_placeholders(
    doc: &mut Document,
    mapping: &BTreeMap<String, String>,
) -> SubstitutionReport {
    let mut found: BTreeMap<String, usize> = BTreeMap::new();

    doc.for_each_paragraph_mut(&mut |p| {
        let text = paragraph::text(p);
        if !text.contains("[[") && !mapping.keys().any(|m| text.contains(m.as_str())) {
            return;
        }
        for (marker, value) in mapping {
            if text.contains(marker.as_str()) {
                let count = paragraph::replace_text(p, marker, value);
                if count > 0 {
                    *found.entry(marker.clone()).or_insert(0) += count;
                }
            }
        }
    });

    let missing: BTreeSet<String> = mapping
        .keys()
        .filter(|marker| !found.contains_key(*marker))
        .cloned()
        .collect();

    info!(
        "Placeholder pass: {} markers replaced ({} occurrences), {} not present",
        found.len(),
        found.values().sum::<usize>(),
        missing.len()
    );
    if !missing.is_empty() {
        debug!("Markers not present in document: {:?}", missing);
    }

    SubstitutionReport { found, missing }
}

/// `[[...]]` markers still present anywhere in the document
pub fn find_unresolved_markers(doc: &Document) -> BTreeSet<String> {
    doc.paragraph_texts()
        .iter()
        .flat_map(|text| MARKER.find_iter(text).map(|m| m.as_str().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paragraph::{new_paragraph, run};
    use crate::xml::XmlElement;
    use pretty_assertions::assert_eq;
    use shared_types::ReportMetadata;

    fn doc_with(lines: &[&str]) -> Document {
        let mut doc = Document::blank().unwrap();
        for line in lines {
            doc.append_paragraph(line);
        }
        doc
    }

    fn mapping(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_client_scenario() {
        let mut doc = doc_with(&["Report for [[client_name]] in [[client_location]]"]);
        let meta = ReportMetadata::from_json_str(
            r#"{"client_name": "Acme Farm", "client_location": "Devon"}"#,
        )
        .unwrap();

        let report = replace_placeholders(&mut doc, &meta.placeholder_map());

        assert_eq!(doc.paragraph_texts(), vec!["Report for Acme Farm in Devon"]);
        assert!(!report.missing.contains("[[client_name]]"));
        assert!(!report.missing.contains("[[client_location]]"));
        assert!(report.missing.is_empty());
    }

    #[test]
    fn test_all_occurrences_replaced_and_missing_reported() {
        let mut doc = doc_with(&["[[a]] then [[a]]", "and [[a]]"]);
        let report = replace_placeholders(&mut doc, &mapping(&[("[[a]]", "x"), ("[[b]]", "y")]));

        assert_eq!(doc.paragraph_texts(), vec!["x then x", "and x"]);
        assert_eq!(report.found.get("[[a]]"), Some(&3));
        assert_eq!(report.replacements(), 3);
        assert!(report.missing.contains("[[b]]"));
    }

    #[test]
    fn test_unmapped_marker_left_verbatim() {
        let mut doc = doc_with(&["Hello [[name]], see [[unknown]]"]);
        replace_placeholders(&mut doc, &mapping(&[("[[name]]", "Devon")]));

        assert_eq!(doc.paragraph_texts(), vec!["Hello Devon, see [[unknown]]"]);
        let unresolved = find_unresolved_markers(&doc);
        assert_eq!(unresolved.into_iter().collect::<Vec<_>>(), vec!["[[unknown]]"]);
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let mut doc = doc_with(&["Client: [[client_name]]"]);
        let map = mapping(&[("[[client_name]]", "Acme Farm")]);

        replace_placeholders(&mut doc, &map);
        let after_first = doc.full_text();
        let report = replace_placeholders(&mut doc, &map);

        assert_eq!(doc.full_text(), after_first);
        assert_eq!(report.replacements(), 0);
        assert!(report.missing.contains("[[client_name]]"));
    }

    #[test]
    fn test_replaces_inside_table_cells() {
        let mut doc = Document::blank().unwrap();
        let mut cell_paragraph = new_paragraph(None);
        cell_paragraph.push(run("[[client_location]]", None));
        let table = XmlElement::new("w:tbl").with_child(
            XmlElement::new("w:tr").with_child(XmlElement::new("w:tc").with_child(cell_paragraph)),
        );
        doc.append_block(table);

        replace_placeholders(&mut doc, &mapping(&[("[[client_location]]", "Devon")]));
        assert_eq!(doc.paragraph_texts(), vec!["Devon"]);
    }

    #[test]
    fn test_replaces_in_header_and_footer_parts() {
        const W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
        let mut package = crate::blank::package();
        package.set_part(
            "word/header1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:hdr xmlns:w="{}"><w:p><w:r><w:t xml:space="preserve">Client [[client_name]]</w:t></w:r></w:p></w:hdr>"#,
                W
            )
            .into_bytes(),
        );
        package.set_part(
            "word/footer2.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:ftr xmlns:w="{}"><w:p><w:r><w:t>[[client_name]]</w:t></w:r><w:r><w:t xml:space="preserve"> page</w:t></w:r></w:p></w:ftr>"#,
                W
            )
            .into_bytes(),
        );
        let mut doc = Document::from_package(package).unwrap();

        let report = replace_placeholders(&mut doc, &mapping(&[("[[client_name]]", "Acme")]));
        assert_eq!(report.found.get("[[client_name]]"), Some(&2));

        let reopened = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(reopened.paragraph_texts(), vec!["Client Acme", "Acme page"]);
        assert!(find_unresolved_markers(&reopened).is_empty());
    }

    #[test]
    fn test_merge_clears_missing_found_elsewhere() {
        let mut first = SubstitutionReport::default();
        first.missing.insert("[[a]]".to_string());
        let mut second = SubstitutionReport::default();
        second.found.insert("[[a]]".to_string(), 1);

        first.merge(second);
        assert!(first.missing.is_empty());
        assert_eq!(first.replacements(), 1);
    }
}
