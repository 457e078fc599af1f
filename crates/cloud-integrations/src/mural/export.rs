//! Whiteboard output pair: the report JSON and the Excel workbook

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::widgets::{NoteColor, OrganizedNotes, StickyNote};
use crate::errors::IntegrationError;

pub const REPORT_JSON_FILE: &str = "mural_content_for_report.json";
pub const TEXT_REPORT_FILE: &str = "mural_extraction_report.txt";

pub const TABLE1_TITLE: &str = "Risks from climate change";
pub const TABLE2_TITLE: &str = "RAPA (Rapid Adaptation Pathways Assessment)";

pub const TABLE1_HEADERS: [&str; 3] = [
    "Key current risks from extreme heat",
    "Key risks from a range of future climate scenarios, including the extreme heat event scenario (up to 50oC)",
    "Key adaptation actions to address different levels of risk (and their thresholds) for extreme heat",
];

pub const RAPA_HEADERS: [&str; 5] = [
    "Adaptation Action",
    "30oC",
    "35oc",
    "Assumptions",
    "Uncertainties",
];

const MAX_COLUMN_WIDTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskColumn {
    pub header: String,
    pub content: Vec<String>,
    pub color: NoteColor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTable {
    pub title: String,
    pub columns: Vec<RiskColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteGroup {
    pub content: Vec<String>,
    pub color: NoteColor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RapaTable {
    pub title: String,
    pub adaptation_actions: NoteGroup,
    pub assumptions: NoteGroup,
}

/// Content of `mural_content_for_report.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuralReport {
    pub table1: RiskTable,
    pub table2: RapaTable,
}

fn contents(notes: &[StickyNote]) -> Vec<String> {
    notes.iter().map(|n| n.content.clone()).collect()
}

impl MuralReport {
    pub fn from_notes(notes: &OrganizedNotes) -> Self {
        let columns = [
            (&notes.yellow, NoteColor::Yellow),
            (&notes.dark_red, NoteColor::DarkRed),
            (&notes.orange, NoteColor::Orange),
        ]
        .into_iter()
        .zip(TABLE1_HEADERS)
        .map(|((notes, color), header)| RiskColumn {
            header: header.to_string(),
            content: contents(notes),
            color,
        })
        .collect();

        Self {
            table1: RiskTable {
                title: TABLE1_TITLE.to_string(),
                columns,
            },
            table2: RapaTable {
                title: TABLE2_TITLE.to_string(),
                adaptation_actions: NoteGroup {
                    content: contents(&notes.green),
                    color: NoteColor::Green,
                },
                assumptions: NoteGroup {
                    content: contents(&notes.blue),
                    color: NoteColor::Blue,
                },
            },
        }
    }

    pub fn has_risks(&self) -> bool {
        self.table1.columns.iter().any(|c| !c.content.is_empty())
    }

    pub fn has_rapa(&self) -> bool {
        !self.table2.adaptation_actions.content.is_empty()
            || !self.table2.assumptions.content.is_empty()
    }

    /// Risk table as rows: the column headers, then one row per note index
    pub fn table1_rows(&self) -> Vec<Vec<String>> {
        let header = self.table1.columns.iter().map(|c| c.header.clone()).collect();
        let depth = self
            .table1
            .columns
            .iter()
            .map(|c| c.content.len())
            .max()
            .unwrap_or(0);

        let mut rows = vec![header];
        for i in 0..depth {
            rows.push(
                self.table1
                    .columns
                    .iter()
                    .map(|c| c.content.get(i).cloned().unwrap_or_default())
                    .collect(),
            );
        }
        rows
    }

    /// RAPA table as rows; actions and assumptions pair up by index
    pub fn rapa_rows(&self) -> Vec<Vec<String>> {
        let actions = &self.table2.adaptation_actions.content;
        let assumptions = &self.table2.assumptions.content;
        let depth = actions.len().max(assumptions.len());

        let mut rows = vec![RAPA_HEADERS.iter().map(|h| h.to_string()).collect()];
        for i in 0..depth {
            rows.push(vec![
                actions.get(i).cloned().unwrap_or_default(),
                String::new(),
                String::new(),
                assumptions.get(i).cloned().unwrap_or_default(),
                String::new(),
            ]);
        }
        rows
    }

    /// Note counts keyed by colour name
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = self
            .table1
            .columns
            .iter()
            .map(|c| (c.color.as_str().to_string(), c.content.len()))
            .collect();
        for group in [&self.table2.adaptation_actions, &self.table2.assumptions] {
            *counts.entry(group.color.as_str().to_string()).or_default() += group.content.len();
        }
        counts
    }
}

pub fn write_report_json(report: &MuralReport, dir: &Path) -> Result<PathBuf, IntegrationError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(REPORT_JSON_FILE);
    std::fs::write(&path, serde_json::to_vec_pretty(report)?)?;
    info!("Wrote whiteboard report JSON to {}", path.display());
    Ok(path)
}

pub fn load_report_json(path: &Path) -> Result<MuralReport, IntegrationError> {
    let raw = std::fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Keep letters, digits, spaces and underscores; drop trailing spaces
pub fn safe_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect::<String>()
        .trim_end()
        .to_string()
}

struct SheetWriter<'a> {
    sheet: &'a mut Worksheet,
    cell: Format,
    header: Format,
    widths: BTreeMap<u16, usize>,
}

impl<'a> SheetWriter<'a> {
    fn new(sheet: &'a mut Worksheet) -> Self {
        let cell = Format::new()
            .set_border(FormatBorder::Thin)
            .set_text_wrap()
            .set_align(FormatAlign::Top);
        let header = Format::new()
            .set_border(FormatBorder::Medium)
            .set_text_wrap()
            .set_align(FormatAlign::Top)
            .set_bold();
        Self {
            sheet,
            cell,
            header,
            widths: BTreeMap::new(),
        }
    }

    /// Write non-empty values only, so blank cells stay unbordered
    fn row<S: AsRef<str>>(&mut self, row: u32, values: &[S], bold: bool) -> Result<(), IntegrationError> {
        for (col, value) in values.iter().enumerate() {
            let value = value.as_ref();
            if value.is_empty() {
                continue;
            }
            let col = col as u16;
            let format = if bold { &self.header } else { &self.cell };
            self.sheet.write_string_with_format(row, col, value, format)?;

            let longest = value.lines().map(|l| l.chars().count()).max().unwrap_or(0);
            let width = self.widths.entry(col).or_default();
            *width = (*width).max(longest);
        }
        Ok(())
    }

    fn fit_columns(&mut self) -> Result<(), IntegrationError> {
        for (&col, &width) in &self.widths {
            let width = (width + 2).min(MAX_COLUMN_WIDTH);
            self.sheet.set_column_width(col, width as f64)?;
        }
        Ok(())
    }
}

/// Write `Mural_Output_<title>_<ts>.xlsx` into `dir`
pub fn write_excel(notes: &OrganizedNotes, title: &str, dir: &Path) -> Result<PathBuf, IntegrationError> {
    std::fs::create_dir_all(dir)?;
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("Mural_Output_{}_{}.xlsx", safe_title(title), timestamp));

    let report = MuralReport::from_notes(notes);
    let mut workbook = Workbook::new();

    {
        let sheet = workbook.add_worksheet().set_name("Sheet1")?;
        let mut out = SheetWriter::new(sheet);

        out.row(0, &["", "Appendix 6:"], false)?;
        out.row(1, &["[PLACEHOLDER]", "Table 1:"], false)?;
        out.row(2, &["TITLE", TABLE1_TITLE], false)?;
        let mut headers = vec!["HEADERS COLUMN"];
        headers.extend(TABLE1_HEADERS);
        out.row(3, &headers, true)?;
        out.row(5, &["CONTENT (GREEN POST-ITS)"], false)?;

        let mut row = 6u32;
        for values in report.table1_rows().into_iter().skip(1) {
            let mut padded = vec![String::new()];
            padded.extend(values);
            out.row(row, &padded, false)?;
            row += 1;
        }

        row += 3;
        out.row(row, &["", "Table 2: RAPA"], true)?;
        row += 1;
        let mut subheaders = vec![""];
        subheaders.extend(RAPA_HEADERS);
        out.row(row, &subheaders, true)?;
        row += 1;

        for values in report.rapa_rows().into_iter().skip(1) {
            let mut padded = vec![String::new()];
            padded.extend(values);
            out.row(row, &padded, false)?;
            row += 1;
        }
        out.fit_columns()?;
    }

    let summary: Vec<(&StickyNote, &str, &str)> = [
        (&notes.yellow, "Table 1", "Yellow"),
        (&notes.dark_red, "Table 1", "Dark Red"),
        (&notes.orange, "Table 1", "Orange"),
        (&notes.green, "Table 2", "Adaptation Actions"),
        (&notes.blue, "Table 2", "Assumptions"),
    ]
    .into_iter()
    .flat_map(|(group, table, column)| group.iter().map(move |n| (n, table, column)))
    .collect();

    if !summary.is_empty() {
        let sheet = workbook.add_worksheet().set_name("Raw Data Summary")?;
        let mut out = SheetWriter::new(sheet);
        out.row(0, &["Color", "Table", "Column", "Content", "Position_X", "Position_Y"], true)?;
        for (i, (note, table, column)) in summary.iter().enumerate() {
            let row = i as u32 + 1;
            out.row(row, &[note.color.as_str(), *table, *column, note.content.as_str()], false)?;
            out.sheet.write_number_with_format(row, 4, note.position_x, &out.cell)?;
            out.sheet.write_number_with_format(row, 5, note.position_y, &out.cell)?;
        }
        out.fit_columns()?;
    }

    workbook.save(&path)?;
    info!("Wrote whiteboard workbook to {}", path.display());
    Ok(path)
}

fn rule(out: &mut String, ch: char) {
    out.push_str(&ch.to_string().repeat(80));
    out.push('\n');
}

fn numbered(out: &mut String, heading: &str, notes: &[StickyNote]) {
    out.push_str(heading);
    out.push('\n');
    rule(out, '-');
    for (i, note) in notes.iter().enumerate() {
        out.push_str(&format!("\n{}. {}\n", i + 1, note.content));
    }
    out.push('\n');
}

/// Plain-text record of one extraction: every note, numbered within its
/// table column, then the notes that fit no table
pub fn render_text_report(
    notes: &OrganizedNotes,
    mural_id: &str,
    title: &str,
    excel_path: &Path,
    generated: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    rule(&mut out, '=');
    out.push_str("MURAL TO EXCEL EXTRACTION REPORT\n");
    rule(&mut out, '=');
    out.push_str(&format!("Generated: {}\n", generated.format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!("Mural ID: {}\n", mural_id));
    out.push_str(&format!("Mural Title: {}\n", title));
    let excel_name = excel_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    out.push_str(&format!("Excel Output: {}\n\n", excel_name));

    rule(&mut out, '=');
    out.push_str(&format!("TABLE 1: {}\n", TABLE1_TITLE.to_uppercase()));
    rule(&mut out, '=');
    numbered(&mut out, &format!("Column 1 - Yellow Notes ({}):", TABLE1_HEADERS[0]), &notes.yellow);
    numbered(&mut out, &format!("Column 2 - Dark Red Notes ({}):", TABLE1_HEADERS[1]), &notes.dark_red);
    numbered(&mut out, &format!("Column 3 - Orange Notes ({}):", TABLE1_HEADERS[2]), &notes.orange);

    rule(&mut out, '=');
    out.push_str(&format!("TABLE 2: {}\n", TABLE2_TITLE));
    rule(&mut out, '=');
    numbered(&mut out, "Adaptation Actions (Green Notes):", &notes.green);
    numbered(&mut out, "Assumptions (Blue Notes):", &notes.blue);

    if !notes.other.is_empty() {
        rule(&mut out, '=');
        out.push_str("OTHER NOTES (Not categorized into tables)\n");
        rule(&mut out, '=');
        for (i, note) in notes.other.iter().enumerate() {
            out.push_str(&format!(
                "\n{}. Color: {}\n   Content: {}\n",
                i + 1,
                note.color.as_str(),
                note.content
            ));
        }
    }
    out
}

/// Write [`TEXT_REPORT_FILE`] into `dir`
pub fn write_text_report(
    notes: &OrganizedNotes,
    mural_id: &str,
    title: &str,
    excel_path: &Path,
    dir: &Path,
) -> Result<PathBuf, IntegrationError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(TEXT_REPORT_FILE);
    let text = render_text_report(notes, mural_id, title, excel_path, Utc::now());
    std::fs::write(&path, text)?;
    info!("Wrote whiteboard text report to {}", path.display());
    Ok(path)
}

/// What is currently on disk for the report pipeline
#[derive(Debug, Clone, Serialize)]
pub struct MuralStatus {
    pub exists: bool,
    pub modified: Option<DateTime<Utc>>,
    pub counts: BTreeMap<String, usize>,
    pub total: usize,
}

pub fn report_status(dir: &Path) -> MuralStatus {
    let path = dir.join(REPORT_JSON_FILE);
    let modified = std::fs::metadata(&path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    match load_report_json(&path) {
        Ok(report) => {
            let counts = report.counts();
            let total = counts.values().sum();
            MuralStatus {
                exists: true,
                modified,
                counts,
                total,
            }
        }
        Err(e) => {
            debug!("No usable whiteboard JSON at {}: {}", path.display(), e);
            MuralStatus {
                exists: false,
                modified,
                counts: BTreeMap::new(),
                total: 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn note(color: NoteColor, content: &str) -> StickyNote {
        StickyNote {
            widget_id: format!("w-{}", content),
            widget_type: "sticky_note".to_string(),
            parent_id: None,
            color,
            color_code: String::new(),
            position_x: 10.0,
            position_y: 20.0,
            content: content.to_string(),
            source_field: "text".to_string(),
        }
    }

    fn organized() -> OrganizedNotes {
        OrganizedNotes {
            yellow: vec![note(NoteColor::Yellow, "Heat stress on livestock"), note(NoteColor::Yellow, "Water shortages")],
            dark_red: vec![note(NoteColor::DarkRed, "Crop failure at 45oC")],
            orange: vec![],
            green: vec![note(NoteColor::Green, "Install shade structures")],
            blue: vec![note(NoteColor::Blue, "Power supply remains reliable"), note(NoteColor::Blue, "Staff available")],
            other: vec![note(NoteColor::White, "Ignored")],
        }
    }

    #[test]
    fn test_report_structure() {
        let report = MuralReport::from_notes(&organized());
        assert_eq!(report.table1.title, TABLE1_TITLE);
        assert_eq!(report.table1.columns.len(), 3);
        assert_eq!(report.table1.columns[1].color, NoteColor::DarkRed);
        assert_eq!(report.table1.columns[0].content, vec!["Heat stress on livestock", "Water shortages"]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["table1"]["columns"][1]["color"], "Dark Red");
        assert_eq!(json["table2"]["assumptions"]["color"], "Blue");
        assert_eq!(json["table2"]["adaptation_actions"]["content"][0], "Install shade structures");
    }

    #[test]
    fn test_table_rows_pad_short_columns() {
        let report = MuralReport::from_notes(&organized());

        let rows = report.table1_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], TABLE1_HEADERS[0]);
        assert_eq!(rows[1], vec!["Heat stress on livestock", "Crop failure at 45oC", ""]);
        assert_eq!(rows[2], vec!["Water shortages", "", ""]);

        let rapa = report.rapa_rows();
        assert_eq!(rapa.len(), 3);
        assert_eq!(rapa[1][0], "Install shade structures");
        assert_eq!(rapa[2][0], "");
        assert_eq!(rapa[2][3], "Staff available");
    }

    #[test]
    fn test_safe_title() {
        assert_eq!(safe_title("Farm / Workshop: 2024  "), "Farm  Workshop 2024");
        assert_eq!(safe_title("plain_name"), "plain_name");
    }

    #[test]
    fn test_json_round_trip_and_status() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!report_status(dir.path()).exists);

        let report = MuralReport::from_notes(&organized());
        let path = write_report_json(&report, dir.path()).unwrap();
        assert_eq!(load_report_json(&path).unwrap(), report);

        let status = report_status(dir.path());
        assert!(status.exists);
        assert!(status.modified.is_some());
        assert_eq!(status.total, 6);
        assert_eq!(status.counts["Blue"], 2);
        assert_eq!(status.counts["Orange"], 0);
    }

    #[test]
    fn test_text_report_numbers_notes_per_column() {
        let generated = DateTime::parse_from_rfc3339("2025-03-01T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let text = render_text_report(
            &organized(),
            "board.1",
            "Farm Workshop",
            Path::new("/tmp/Mural_Output_Farm Workshop_1.xlsx"),
            generated,
        );

        assert!(text.contains("Generated: 2025-03-01 09:30:00"));
        assert!(text.contains("Mural ID: board.1"));
        assert!(text.contains("Excel Output: Mural_Output_Farm Workshop_1.xlsx"));
        assert!(text.contains("TABLE 1: RISKS FROM CLIMATE CHANGE"));
        assert!(text.contains("\n1. Heat stress on livestock\n"));
        assert!(text.contains("\n2. Water shortages\n"));
        assert!(text.contains("\n2. Staff available\n"));
        assert!(text.contains("OTHER NOTES"));
        assert!(text.contains("1. Color: White\n   Content: Ignored"));

        let yellow = text.find("Heat stress on livestock").unwrap();
        let assumptions = text.find("Assumptions (Blue Notes)").unwrap();
        assert!(yellow < assumptions);
    }

    #[test]
    fn test_text_report_omits_empty_other_section() {
        let mut notes = organized();
        notes.other.clear();
        let dir = tempfile::tempdir().unwrap();

        let path = write_text_report(&notes, "b", "t", Path::new("x.xlsx"), dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), TEXT_REPORT_FILE);
        let text = std::fs::read_to_string(path).unwrap();
        assert!(!text.contains("OTHER NOTES"));
        assert!(text.contains("Install shade structures"));
    }

    #[test]
    fn test_write_excel_creates_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_excel(&organized(), "Farm Workshop", dir.path()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("Mural_Output_Farm Workshop_"));
        assert!(name.ends_with(".xlsx"));
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
