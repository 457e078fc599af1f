//! Narrative insertion at marker paragraphs
//!
//! Generated text arrives as lightly formatted plain text: blocks
//! separated by blank lines, `- ` / `* ` bullet lines, `# ` headings and
//! `**bold**` spans. Each block becomes its own paragraph carrying the
//! placeholder paragraph's formatting.

use tracing::debug;

use crate::document::Document;
use crate::paragraph::{self, bold_run, new_paragraph, run};
use crate::xml::XmlElement;

pub const BULLET_STYLE: &str = "ListBullet";
pub const HEADING_STYLE: &str = "Heading1";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Paragraph(String),
    Bullet(String),
    Heading(String),
}

/// Replace every body paragraph containing `marker` with paragraphs
/// built from `text`. Markers inside table cells are not block positions
/// and are left for the unresolved-marker scan. Returns false when the
/// marker is not in the body.
pub fn insert_paragraphs_at(doc: &mut Document, marker: &str, text: &str) -> bool {
    let indices = doc.find_paragraphs(marker);
    if indices.is_empty() {
        return false;
    }
    let blocks = parse_blocks(text);

    // Last first, so earlier indices stay valid
    for &index in indices.iter().rev() {
        let Some(placeholder) = doc.remove_block(index) else {
            continue;
        };
        let props = paragraph::properties(&placeholder);
        let run_props = paragraph::first_run_properties(&placeholder);

        let paragraphs: Vec<XmlElement> = blocks
            .iter()
            .map(|block| build_paragraph(block, props.clone(), run_props.as_ref()))
            .collect();
        doc.insert_blocks(index, paragraphs);
    }

    debug!(
        "Inserted {} blocks at {} occurrence(s) of {}",
        blocks.len(),
        indices.len(),
        marker
    );
    true
}

fn parse_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            flush(&mut pending, &mut blocks);
        } else if let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            flush(&mut pending, &mut blocks);
            blocks.push(Block::Bullet(item.trim().to_string()));
        } else if let Some(heading) = line.strip_prefix('#') {
            flush(&mut pending, &mut blocks);
            blocks.push(Block::Heading(heading.trim_start_matches('#').trim().to_string()));
        } else {
            pending.push(line);
        }
    }
    flush(&mut pending, &mut blocks);

    blocks
}

fn flush(pending: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if !pending.is_empty() {
        blocks.push(Block::Paragraph(pending.join(" ")));
        pending.clear();
    }
}

fn build_paragraph(
    block: &Block,
    props: Option<XmlElement>,
    run_props: Option<&XmlElement>,
) -> XmlElement {
    let (text, style) = match block {
        Block::Paragraph(text) => (text, None),
        Block::Bullet(text) => (text, Some(BULLET_STYLE)),
        Block::Heading(text) => (text, Some(HEADING_STYLE)),
    };

    let mut p = new_paragraph(props);
    if let Some(style) = style {
        paragraph::set_style(&mut p, style);
    }
    for (segment, bold) in split_bold(text) {
        if bold {
            p.push(bold_run(&segment, run_props));
        } else {
            p.push(run(&segment, run_props));
        }
    }
    p
}

/// Split `**bold**` spans out of a line. An unmatched `**` is kept as
/// literal text.
fn split_bold(text: &str) -> Vec<(String, bool)> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("**") else {
            break;
        };
        if start > 0 {
            segments.push((rest[..start].to_string(), false));
        }
        if end > 0 {
            segments.push((after[..end].to_string(), true));
        }
        rest = &after[end + 2..];
    }
    if !rest.is_empty() || segments.is_empty() {
        segments.push((rest.to_string(), false));
    }
    segments
}
