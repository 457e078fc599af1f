//! Table construction from a [`SheetGrid`] and a [`TableStyle`]

use tracing::{debug, info};

use crate::document::{Document, TABLE};
use crate::errors::DocxError;
use crate::paragraph::{new_paragraph, run, PARAGRAPH_PROPS, RUN_PROPS};
use crate::xml::XmlElement;

use super::grid::SheetGrid;
use super::style::TableStyle;

const BORDER_COLOR: &str = "A6A6A6";

/// Build a `w:tbl` element for an already trimmed grid
pub fn build_table(grid: &SheetGrid, style: &TableStyle) -> Result<XmlElement, DocxError> {
    if grid.is_empty() {
        return Err(DocxError::EmptyTable(grid.name.clone()));
    }

    let columns = grid.column_count();
    let widths = style.widths_for(columns);
    let total_width: u32 = widths.iter().sum();

    let mut table = XmlElement::new(TABLE).with_child(table_properties(total_width));

    let mut col_grid = XmlElement::new("w:tblGrid");
    for width in &widths {
        col_grid.push(XmlElement::new("w:gridCol").with_attr("w:w", width.to_string()));
    }
    table.push(col_grid);

    for (row_index, row) in grid.rows.iter().enumerate() {
        let header = row_index == 0;
        let fill = if header {
            Some(style.header_fill.as_str())
        } else if row_index % 2 == 0 {
            style.banded_fill.as_deref()
        } else {
            None
        };

        let mut tr = XmlElement::new("w:tr");
        if header {
            tr.push(XmlElement::new("w:trPr").with_child(XmlElement::new("w:tblHeader")));
        }
        for (col, width) in widths.iter().enumerate() {
            let text = row.get(col).map(String::as_str).unwrap_or("");
            tr.push(cell(text, *width, fill, header, style, col));
        }
        table.push(tr);
    }

    Ok(table)
}

fn table_properties(total_width: u32) -> XmlElement {
    let border = |name: &str| {
        XmlElement::new(name)
            .with_attr("w:val", "single")
            .with_attr("w:sz", "4")
            .with_attr("w:space", "0")
            .with_attr("w:color", BORDER_COLOR)
    };

    XmlElement::new("w:tblPr")
        .with_child(XmlElement::new("w:tblStyle").with_attr("w:val", "TableGrid"))
        .with_child(
            XmlElement::new("w:tblW")
                .with_attr("w:w", total_width.to_string())
                .with_attr("w:type", "dxa"),
        )
        .with_child(
            XmlElement::new("w:tblBorders")
                .with_child(border("w:top"))
                .with_child(border("w:left"))
                .with_child(border("w:bottom"))
                .with_child(border("w:right"))
                .with_child(border("w:insideH"))
                .with_child(border("w:insideV")),
        )
        .with_child(XmlElement::new("w:tblLayout").with_attr("w:type", "fixed"))
}

fn cell(
    text: &str,
    width: u32,
    fill: Option<&str>,
    header: bool,
    style: &TableStyle,
    col: usize,
) -> XmlElement {
    let mut tc_props = XmlElement::new("w:tcPr").with_child(
        XmlElement::new("w:tcW")
            .with_attr("w:w", width.to_string())
            .with_attr("w:type", "dxa"),
    );
    if let Some(fill) = fill {
        tc_props.push(
            XmlElement::new("w:shd")
                .with_attr("w:val", "clear")
                .with_attr("w:color", "auto")
                .with_attr("w:fill", fill),
        );
    }

    let mut run_props = XmlElement::new(RUN_PROPS);
    if header {
        run_props.push(XmlElement::new("w:b"));
        run_props.push(XmlElement::new("w:color").with_attr("w:val", style.header_font_color.as_str()));
    }
    let size = style.body_font_size.to_string();
    run_props.push(XmlElement::new("w:sz").with_attr("w:val", size.as_str()));
    run_props.push(XmlElement::new("w:szCs").with_attr("w:val", size.as_str()));

    let alignment = if header { "center" } else { style.alignment(col).as_str() };
    let paragraph_props = XmlElement::new(PARAGRAPH_PROPS)
        .with_child(
            XmlElement::new("w:spacing")
                .with_attr("w:before", "40")
                .with_attr("w:after", "40"),
        )
        .with_child(XmlElement::new("w:jc").with_attr("w:val", alignment));

    let mut p = new_paragraph(Some(paragraph_props));
    // Keep one paragraph per line so multi-line cells render as typed
    let mut lines = text.split('\n');
    let first = lines.next().unwrap_or("");
    p.push(run(first, Some(&run_props)));
    for line in lines {
        let mut r = XmlElement::new("w:r").with_child(run_props.clone());
        r.push(XmlElement::new("w:br"));
        r.push(
            XmlElement::new("w:t")
                .with_attr("xml:space", "preserve")
                .with_text(line),
        );
        p.push(r);
    }

    XmlElement::new("w:tc").with_child(tc_props).with_child(p)
}

/// Replace the body paragraph containing `marker` with a table built from
/// `grid`. The grid is trimmed first. Returns false when the marker is
/// not in the body.
pub fn insert_table_at(
    doc: &mut Document,
    marker: &str,
    grid: &SheetGrid,
    style: &TableStyle,
) -> Result<bool, DocxError> {
    let Some(index) = doc.find_paragraph(marker) else {
        debug!("Table marker {} not found", marker);
        return Ok(false);
    };

    let trimmed = grid.trimmed();
    let table = build_table(&trimmed, style)?;

    doc.remove_block(index);
    doc.insert_blocks(index, vec![table]);

    info!(
        "Inserted table '{}' at {} ({} data rows x {} columns, style {})",
        grid.name,
        marker,
        trimmed.data_rows().len(),
        trimmed.column_count(),
        style.name
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paragraph;
    use crate::tables::style::style_for;
    use pretty_assertions::assert_eq;

    fn monitoring_grid() -> SheetGrid {
        SheetGrid::new(
            "Monitoring",
            vec![
                vec!["Indicator".into(), "".into(), " Frequency ".into(), "Owner".into()],
                vec!["Rainfall".into(), "".into(), "Monthly".into(), "Farm manager".into()],
                vec!["".into(), "".into(), "".into(), "".into()],
                vec!["Soil moisture".into(), "".into(), "Weekly".into(), "".into()],
            ],
        )
    }

    fn cell_texts(table: &XmlElement) -> Vec<Vec<String>> {
        table
            .elements()
            .filter(|el| el.name == "w:tr")
            .map(|tr| {
                tr.elements()
                    .filter(|el| el.name == "w:tc")
                    .map(|tc| {
                        tc.descendants("w:p")
                            .into_iter()
                            .map(paragraph::text)
                            .collect::<String>()
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_table_has_r_plus_one_rows_and_c_columns() {
        let grid = monitoring_grid().trimmed();
        let table = build_table(&grid, &style_for("table-7_monitoring")).unwrap();

        let texts = cell_texts(&table);
        assert_eq!(texts.len(), grid.data_rows().len() + 1);
        assert_eq!(
            texts,
            vec![
                vec!["Indicator", "Frequency", "Owner"],
                vec!["Rainfall", "Monthly", "Farm manager"],
                vec!["Soil moisture", "Weekly", ""],
            ]
        );

        let grid_cols = table.child("w:tblGrid").unwrap().elements().count();
        assert_eq!(grid_cols, 3);
    }

    #[test]
    fn test_header_row_is_shaded_and_bold() {
        let style = style_for("table-7_monitoring");
        let table = build_table(&monitoring_grid().trimmed(), &style).unwrap();
        let header = table.elements().find(|el| el.name == "w:tr").unwrap();

        let fills: Vec<_> = header
            .descendants("w:shd")
            .into_iter()
            .filter_map(|s| s.attr("w:fill"))
            .collect();
        assert_eq!(fills, vec![style.header_fill.as_str(); 3]);
        assert_eq!(header.descendants("w:b").len(), 3);
    }

    #[test]
    fn test_insert_table_replaces_marker() {
        let mut doc = Document::blank().unwrap();
        doc.append_paragraph("Intro");
        doc.append_paragraph("[[table-7_monitoring]]");

        let inserted = insert_table_at(
            &mut doc,
            "[[table-7_monitoring]]",
            &monitoring_grid(),
            &style_for("table-7_monitoring"),
        )
        .unwrap();

        assert!(inserted);
        assert_eq!(doc.tables().len(), 1);
        assert_eq!(doc.find_paragraph("[[table-7_monitoring]]"), None);
        let names: Vec<&str> = doc.body().elements().map(|el| el.name.as_str()).collect();
        assert_eq!(names, vec!["w:p", "w:tbl", "w:sectPr"]);
    }

    #[test]
    fn test_empty_grid_is_an_error_and_leaves_marker() {
        let mut doc = Document::blank().unwrap();
        doc.append_paragraph("[[rapa-1]]");
        let empty = SheetGrid::new("Empty", vec![vec!["  ".into()]]);

        let result = insert_table_at(&mut doc, "[[rapa-1]]", &empty, &style_for("rapa-1"));
        assert!(matches!(result, Err(DocxError::EmptyTable(_))));
        assert!(doc.find_paragraph("[[rapa-1]]").is_some());
    }

    #[test]
    fn test_missing_marker_returns_false() {
        let mut doc = Document::blank().unwrap();
        let inserted =
            insert_table_at(&mut doc, "[[cadd-1_current]]", &monitoring_grid(), &style_for("cadd-1_current"))
                .unwrap();
        assert!(!inserted);
        assert!(doc.tables().is_empty());
    }
}
