//! Inline image insertion
//!
//! Images (logos, charts) are stored as media parts next to the main
//! document part and drawn inline in place of a marker paragraph's text.

use imagesize::ImageType;
use tracing::debug;

use crate::document::Document;
use crate::errors::DocxError;
use crate::package::REL_IMAGE;
use crate::paragraph::{self, new_paragraph, RUN};
use crate::xml::XmlElement;

/// English Metric Units per inch
pub const EMU_PER_INCH: f64 = 914_400.0;

const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Supported image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
        }
    }
}

/// Format and pixel dimensions of an image held in memory
pub fn image_info(bytes: &[u8], file_name: &str) -> Result<(ImageFormat, usize, usize), DocxError> {
    let invalid = || DocxError::InvalidImage(file_name.to_string());

    let format = match imagesize::image_type(bytes).map_err(|_| invalid())? {
        ImageType::Png => ImageFormat::Png,
        ImageType::Jpeg => ImageFormat::Jpeg,
        ImageType::Gif => ImageFormat::Gif,
        _ => return Err(invalid()),
    };
    let size = imagesize::blob_size(bytes).map_err(|_| invalid())?;
    if size.width == 0 || size.height == 0 {
        return Err(invalid());
    }
    Ok((format, size.width, size.height))
}

/// Replace the content of every body paragraph containing `marker` with
/// an inline image `width_inches` wide. The image is stored once and
/// shared by all occurrences. Returns false when the marker is not in the
/// body.
pub fn insert_image_at(
    doc: &mut Document,
    marker: &str,
    bytes: &[u8],
    file_name: &str,
    width_inches: f64,
) -> Result<bool, DocxError> {
    let indices = doc.find_paragraphs(marker);
    if indices.is_empty() {
        return Ok(false);
    }

    let (format, width_px, height_px) = image_info(bytes, file_name)?;
    let cx = (width_inches * EMU_PER_INCH).round() as u64;
    let cy = (cx as f64 * height_px as f64 / width_px as f64).round() as u64;

    let main_part = doc.main_part().to_string();
    let dir = main_part
        .rsplit_once('/')
        .map(|(dir, _)| format!("{}/", dir))
        .unwrap_or_default();

    let package = doc.package_mut();
    let mut n = 1;
    let media_name = loop {
        let candidate = format!("media/image{}.{}", n, format.extension());
        if !package.has_part(&format!("{}{}", dir, candidate)) {
            break candidate;
        }
        n += 1;
    };
    package.set_part(format!("{}{}", dir, media_name), bytes.to_vec());
    package.ensure_default_content_type(format.extension(), format.content_type())?;
    let rel_id = package.add_relationship(&main_part, REL_IMAGE, &media_name)?;

    doc.ensure_namespace("wp", NS_WP);
    doc.ensure_namespace("r", NS_R);

    let mut drawing_id = doc.body().descendants("wp:docPr").len();
    for index in indices {
        drawing_id += 1;
        let drawing = inline_drawing(&rel_id, drawing_id, file_name, cx, cy);
        let Some(p) = doc.paragraph_at_mut(index) else {
            continue;
        };
        let props = paragraph::properties(p);
        let mut replacement = new_paragraph(props);
        replacement.push(XmlElement::new(RUN).with_child(drawing));
        *p = replacement;
    }

    debug!(
        "Inserted {} ({}x{} px) at {} as {}",
        file_name, width_px, height_px, marker, rel_id
    );
    Ok(true)
}

fn inline_drawing(rel_id: &str, id: usize, name: &str, cx: u64, cy: u64) -> XmlElement {
    let id = id.to_string();
    let cx = cx.to_string();
    let cy = cy.to_string();

    let extent = |name: &str| {
        XmlElement::new(name)
            .with_attr("cx", cx.as_str())
            .with_attr("cy", cy.as_str())
    };

    let picture = XmlElement::new("pic:pic")
        .with_attr("xmlns:pic", NS_PIC)
        .with_child(
            XmlElement::new("pic:nvPicPr")
                .with_child(
                    XmlElement::new("pic:cNvPr")
                        .with_attr("id", id.as_str())
                        .with_attr("name", name),
                )
                .with_child(XmlElement::new("pic:cNvPicPr")),
        )
        .with_child(
            XmlElement::new("pic:blipFill")
                .with_child(XmlElement::new("a:blip").with_attr("r:embed", rel_id))
                .with_child(XmlElement::new("a:stretch").with_child(XmlElement::new("a:fillRect"))),
        )
        .with_child(
            XmlElement::new("pic:spPr")
                .with_child(
                    XmlElement::new("a:xfrm")
                        .with_child(XmlElement::new("a:off").with_attr("x", "0").with_attr("y", "0"))
                        .with_child(extent("a:ext")),
                )
                .with_child(
                    XmlElement::new("a:prstGeom")
                        .with_attr("prst", "rect")
                        .with_child(XmlElement::new("a:avLst")),
                ),
        );

    XmlElement::new("w:drawing").with_child(
        XmlElement::new("wp:inline")
            .with_attr("distT", "0")
            .with_attr("distB", "0")
            .with_attr("distL", "0")
            .with_attr("distR", "0")
            .with_child(extent("wp:extent"))
            .with_child(
                XmlElement::new("wp:docPr")
                    .with_attr("id", id.as_str())
                    .with_attr("name", format!("Picture {}", id)),
            )
            .with_child(
                XmlElement::new("a:graphic")
                    .with_attr("xmlns:a", NS_A)
                    .with_child(
                        XmlElement::new("a:graphicData")
                            .with_attr("uri", NS_PIC)
                            .with_child(picture),
                    ),
            ),
    )
}
