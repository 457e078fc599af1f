//! OPC package (zip container) handling
//!
//! Every part is held as raw bytes keyed by its part name. Parts the
//! engine edits are parsed on demand by [`crate::document::Document`].

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::DocxError;
use crate::xml::{self, XmlElement};

pub const CONTENT_TYPES: &str = "[Content_Types].xml";
pub const PACKAGE_RELS: &str = "_rels/.rels";

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// Decompressed size caps applied when reading an uploaded package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageLimits {
    pub max_part: u64,
    pub max_total: u64,
}

impl Default for PackageLimits {
    fn default() -> Self {
        Self {
            max_part: 64 * 1024 * 1024,
            max_total: 256 * 1024 * 1024,
        }
    }
}

/// All parts of a `.docx` package
#[derive(Debug, Clone, Default)]
pub struct Package {
    parts: BTreeMap<String, Vec<u8>>,
}

impl Package {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a package from disk
    pub fn open(path: &Path) -> Result<Self, DocxError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Read a package from memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocxError> {
        Self::from_bytes_limited(bytes, PackageLimits::default())
    }

    /// Read a package, refusing parts that inflate past `limits`. Sizes
    /// declared in the archive are not trusted.
    pub fn from_bytes_limited(bytes: &[u8], limits: PackageLimits) -> Result<Self, DocxError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = BTreeMap::new();
        let mut total: u64 = 0;

        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            validate_part_name(&name)?;
            let mut data = Vec::new();
            (&mut file).take(limits.max_part + 1).read_to_end(&mut data)?;
            if data.len() as u64 > limits.max_part {
                return Err(DocxError::TooLarge {
                    part: name,
                    limit: limits.max_part,
                });
            }
            total += data.len() as u64;
            if total > limits.max_total {
                return Err(DocxError::TooLarge {
                    part: "package".to_string(),
                    limit: limits.max_total,
                });
            }
            parts.insert(name, data);
        }

        if !parts.contains_key(CONTENT_TYPES) {
            return Err(DocxError::MissingPart(CONTENT_TYPES.to_string()));
        }

        Ok(Self { parts })
    }

    /// Write the package to a zip archive in memory.
    ///
    /// `[Content_Types].xml` is always the first entry.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DocxError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        if let Some(content_types) = self.parts.get(CONTENT_TYPES) {
            writer.start_file(CONTENT_TYPES, options)?;
            writer.write_all(content_types)?;
        }
        for (name, data) in self.parts.iter().filter(|(name, _)| *name != CONTENT_TYPES) {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(data)?;
        }

        Ok(writer.finish()?.into_inner())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(Vec::as_slice)
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    pub fn set_part(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.parts.insert(name.into(), data);
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Parse an XML part
    pub fn xml_part(&self, name: &str) -> Result<XmlElement, DocxError> {
        let bytes = self
            .part(name)
            .ok_or_else(|| DocxError::MissingPart(name.to_string()))?;
        xml::parse(name, bytes)
    }

    /// Serialize and store an XML part
    pub fn set_xml_part(&mut self, name: &str, root: &XmlElement) -> Result<(), DocxError> {
        let bytes = xml::to_bytes(name, root)?;
        self.set_part(name, bytes);
        Ok(())
    }

    /// Name of the main document part, resolved through the package
    /// relationships and defaulting to `word/document.xml`
    pub fn main_document_part(&self) -> String {
        self.xml_part(PACKAGE_RELS)
            .ok()
            .and_then(|rels| {
                rels.elements()
                    .find(|rel| rel.attr("Type") == Some(REL_OFFICE_DOCUMENT))
                    .and_then(|rel| rel.attr("Target"))
                    .map(|target| target.trim_start_matches('/').to_string())
            })
            .unwrap_or_else(|| "word/document.xml".to_string())
    }

    /// Relationship part that belongs to `part` (`word/_rels/document.xml.rels`)
    pub fn rels_part_for(part: &str) -> String {
        match part.rsplit_once('/') {
            Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
            None => format!("_rels/{}.rels", part),
        }
    }

    /// Register a content type default for an extension if none exists
    pub fn ensure_default_content_type(
        &mut self,
        extension: &str,
        content_type: &str,
    ) -> Result<(), DocxError> {
        let mut types = self.xml_part(CONTENT_TYPES)?;
        let exists = types.elements().any(|el| {
            el.name == "Default"
                && el
                    .attr("Extension")
                    .map(|ext| ext.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
        });
        if exists {
            return Ok(());
        }

        let default = XmlElement::new("Default")
            .with_attr("Extension", extension)
            .with_attr("ContentType", content_type);
        // Defaults must precede Overrides
        let insert_at = types
            .children
            .iter()
            .position(|node| matches!(node, xml::XmlNode::Element(el) if el.name == "Override"))
            .unwrap_or(types.children.len());
        types.children.insert(insert_at, xml::XmlNode::Element(default));
        self.set_xml_part(CONTENT_TYPES, &types)
    }

    /// Add a relationship from `source_part` and return its id
    pub fn add_relationship(
        &mut self,
        source_part: &str,
        rel_type: &str,
        target: &str,
    ) -> Result<String, DocxError> {
        let rels_name = Self::rels_part_for(source_part);
        let mut rels = if self.has_part(&rels_name) {
            self.xml_part(&rels_name)?
        } else {
            XmlElement::new("Relationships").with_attr(
                "xmlns",
                "http://schemas.openxmlformats.org/package/2006/relationships",
            )
        };

        let next = rels
            .elements()
            .filter_map(|rel| rel.attr("Id"))
            .filter_map(|id| id.strip_prefix("rId"))
            .filter_map(|n| n.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let id = format!("rId{}", next);

        rels.push(
            XmlElement::new("Relationship")
                .with_attr("Id", id.as_str())
                .with_attr("Type", rel_type)
                .with_attr("Target", target),
        );
        self.set_xml_part(&rels_name, &rels)?;
        Ok(id)
    }
}

/// Reject part names that could escape the package when extracted
fn validate_part_name(name: &str) -> Result<(), DocxError> {
    if name.contains("..") || name.starts_with('/') || name.contains('\\') {
        return Err(DocxError::InvalidPartName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blank;

    #[test]
    fn test_blank_package_round_trip() {
        let package = blank::package();
        let bytes = package.to_bytes().unwrap();
        let reopened = Package::from_bytes(&bytes).unwrap();

        let names: Vec<&str> = reopened.part_names().collect();
        assert!(names.contains(&"word/document.xml"));
        assert!(names.contains(&CONTENT_TYPES));
        assert_eq!(reopened.main_document_part(), "word/document.xml");
    }

    #[test]
    fn test_inflated_size_is_capped() {
        let mut package = blank::package();
        package.set_part("word/media/big.bin", vec![0u8; 4096]);
        let bytes = package.to_bytes().unwrap();

        let per_part = PackageLimits {
            max_part: 1024,
            max_total: u64::MAX,
        };
        match Package::from_bytes_limited(&bytes, per_part) {
            Err(DocxError::TooLarge { part, limit }) => {
                assert_eq!(part, "word/media/big.bin");
                assert_eq!(limit, 1024);
            }
            other => panic!("expected TooLarge, got {:?}", other.map(|_| ())),
        }

        let total = PackageLimits {
            max_part: 8192,
            max_total: 4096,
        };
        assert!(matches!(
            Package::from_bytes_limited(&bytes, total),
            Err(DocxError::TooLarge { .. })
        ));

        assert!(Package::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn test_from_bytes_rejects_non_zip() {
        assert!(Package::from_bytes(b"definitely not a zip").is_err());
    }

    #[test]
    fn test_rels_part_for() {
        assert_eq!(
            Package::rels_part_for("word/document.xml"),
            "word/_rels/document.xml.rels"
        );
        assert_eq!(Package::rels_part_for("doc.xml"), "_rels/doc.xml.rels");
    }

    #[test]
    fn test_add_relationship_allocates_next_id() {
        let mut package = blank::package();
        let first = package
            .add_relationship("word/document.xml", REL_IMAGE, "media/a.png")
            .unwrap();
        let second = package
            .add_relationship("word/document.xml", REL_IMAGE, "media/b.png")
            .unwrap();
        assert_ne!(first, second);

        let rels = package.xml_part("word/_rels/document.xml.rels").unwrap();
        assert!(rels
            .elements()
            .any(|rel| rel.attr("Target") == Some("media/b.png")));
    }

    #[test]
    fn test_ensure_default_content_type_is_idempotent() {
        let mut package = blank::package();
        package.ensure_default_content_type("png", "image/png").unwrap();
        package.ensure_default_content_type("PNG", "image/png").unwrap();

        let types = package.xml_part(CONTENT_TYPES).unwrap();
        let png_defaults = types
            .elements()
            .filter(|el| el.attr("Extension") == Some("png"))
            .count();
        assert_eq!(png_defaults, 1);
    }

    #[test]
    fn test_validate_part_name() {
        assert!(validate_part_name("word/document.xml").is_ok());
        assert!(validate_part_name("../evil.xml").is_err());
        assert!(validate_part_name("/abs.xml").is_err());
    }
}
