//! Table style registry

use serde::Serialize;

/// Usable width of an A4 page with one-inch margins, in twips
pub const CONTENT_WIDTH: u32 = 9026;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }
}

/// How one named table region is formatted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStyle {
    /// Style name (the table placeholder key)
    pub name: String,
    pub description: String,
    /// Column widths in twips. Columns beyond this list share what is
    /// left of [`CONTENT_WIDTH`].
    pub column_widths: Vec<u32>,
    /// Header cell fill, hex RGB without `#`
    pub header_fill: String,
    /// Header font color, hex RGB without `#`
    pub header_font_color: String,
    /// Body font size in half-points
    pub body_font_size: u32,
    /// Per-column alignment; missing entries are left aligned
    pub alignments: Vec<Alignment>,
    /// Fill for every second body row
    pub banded_fill: Option<String>,
}

impl TableStyle {
    fn new(name: &str, description: &str, column_widths: &[u32], header_fill: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            column_widths: column_widths.to_vec(),
            header_fill: header_fill.to_string(),
            header_font_color: "FFFFFF".to_string(),
            body_font_size: 18,
            alignments: Vec::new(),
            banded_fill: None,
        }
    }

    fn with_alignments(mut self, alignments: &[Alignment]) -> Self {
        self.alignments = alignments.to_vec();
        self
    }

    fn with_banding(mut self, fill: &str) -> Self {
        self.banded_fill = Some(fill.to_string());
        self
    }

    fn with_header_font(mut self, color: &str) -> Self {
        self.header_font_color = color.to_string();
        self
    }

    /// Style used for table names not in the registry
    pub fn default_style(name: &str) -> Self {
        Self::new(name, "Default table", &[], "1F4E79")
    }

    /// Widths for `columns` columns
    pub fn widths_for(&self, columns: usize) -> Vec<u32> {
        let fixed: Vec<u32> = self.column_widths.iter().copied().take(columns).collect();
        let remaining_columns = columns - fixed.len();
        if remaining_columns == 0 {
            return fixed;
        }
        let used: u32 = fixed.iter().sum();
        let share = CONTENT_WIDTH
            .saturating_sub(used)
            .max(720 * remaining_columns as u32)
            / remaining_columns as u32;
        fixed
            .into_iter()
            .chain(std::iter::repeat(share).take(remaining_columns))
            .collect()
    }

    pub fn alignment(&self, column: usize) -> Alignment {
        self.alignments.get(column).copied().unwrap_or(Alignment::Left)
    }
}

use Alignment::{Center, Left};

/// List every named table style
pub fn list_table_styles() -> Vec<TableStyle> {
    vec![
        TableStyle::new(
            "table-1_identified-impacts",
            "Identified climate impacts by hazard",
            &[2200, 3413, 3413],
            "1F4E79",
        )
        .with_banding("DEEAF6"),
        TableStyle::new(
            "table-3_a",
            "Risk assessment matrix",
            &[2600, 1600, 1600, 3226],
            "2E75B6",
        )
        .with_alignments(&[Left, Center, Center, Left]),
        TableStyle::new(
            "table-4_current_strengths",
            "Current adaptive strengths",
            &[3000, 6026],
            "548235",
        )
        .with_banding("E2EFDA"),
        TableStyle::new(
            "table-5_development_actions",
            "Adaptive capacity development actions",
            &[2800, 3626, 1300, 1300],
            "548235",
        )
        .with_alignments(&[Left, Left, Center, Center]),
        TableStyle::new(
            "table-7_monitoring",
            "Monitoring and review schedule",
            &[3000, 3026, 1500, 1500],
            "7F6000",
        )
        .with_alignments(&[Left, Left, Center, Center]),
        TableStyle::new(
            "table-A2_hazards",
            "Climate hazard projections",
            &[2400, 2200, 2200, 2226],
            "C55A11",
        )
        .with_alignments(&[Left, Center, Center, Center])
        .with_banding("FBE5D6"),
        TableStyle::new(
            "table_A5_monitoring",
            "Appendix monitoring indicators",
            &[3000, 3026, 3000],
            "7F6000",
        ),
        TableStyle::new(
            "cadd-1_current",
            "Current adaptive capacity assessment",
            &[3000, 4526, 1500],
            "375623",
        )
        .with_alignments(&[Left, Left, Center]),
        TableStyle::new(
            "cadd-2_add",
            "Additional adaptive capacity needs",
            &[3000, 4526, 1500],
            "375623",
        )
        .with_alignments(&[Left, Left, Center]),
        TableStyle::new(
            "rapa-1",
            "Adaptation actions",
            &[4513, 4513],
            "70AD47",
        )
        .with_banding("E2EFDA"),
        TableStyle::new(
            "rapa-2",
            "Adaptation assumptions",
            &[4513, 4513],
            "5B9BD5",
        )
        .with_banding("DDEBF7"),
        TableStyle::new(
            "mural_table1",
            "Whiteboard climate impacts",
            &[3008, 3009, 3009],
            "FFD966",
        )
        .with_header_font("000000"),
        TableStyle::new(
            "mural_rapa",
            "Whiteboard adaptation actions and assumptions",
            &[4513, 4513],
            "70AD47",
        ),
    ]
}

/// Style registered under `name`, or the default style
pub fn style_for(name: &str) -> TableStyle {
    list_table_styles()
        .into_iter()
        .find(|style| style.name == name)
        .unwrap_or_else(|| TableStyle::default_style(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_registry_names() {
        let names: Vec<String> = list_table_styles().into_iter().map(|s| s.name).collect();
        for expected in [
            "table-1_identified-impacts",
            "table-3_a",
            "table-4_current_strengths",
            "table-5_development_actions",
            "table-7_monitoring",
            "table-A2_hazards",
            "table_A5_monitoring",
            "cadd-1_current",
            "cadd-2_add",
            "rapa-1",
            "rapa-2",
            "mural_table1",
            "mural_rapa",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[test]
    fn test_registered_widths_fit_the_page() {
        for style in list_table_styles() {
            let total: u32 = style.column_widths.iter().sum();
            assert!(total <= CONTENT_WIDTH, "{} is {} wide", style.name, total);
        }
    }

    #[test]
    fn test_unknown_name_uses_default() {
        let style = style_for("table-99_unknown");
        assert_eq!(style.name, "table-99_unknown");
        assert!(style.column_widths.is_empty());
        assert_eq!(style.widths_for(2), vec![4513, 4513]);
    }

    #[test]
    fn test_extra_columns_share_remaining_width() {
        let style = style_for("rapa-1");
        assert_eq!(style.widths_for(1), vec![4513]);
        let widths = style.widths_for(3);
        assert_eq!(widths.len(), 3);
        assert_eq!(&widths[..2], &[4513, 4513]);
        assert!(widths[2] >= 720);
    }

    #[test]
    fn test_alignment_defaults_to_left() {
        let style = style_for("table-3_a");
        assert_eq!(style.alignment(1), Alignment::Center);
        assert_eq!(style.alignment(10), Alignment::Left);
    }
}
