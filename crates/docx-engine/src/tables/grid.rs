//! Spreadsheet grids feeding the table formatter

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde::Serialize;
use tracing::debug;

use crate::errors::DocxError;

/// Cell text of one sheet; the first row is the header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetGrid {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl SheetGrid {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Trim every cell, pad ragged rows, then drop columns and rows that
    /// are empty throughout
    pub fn trimmed(&self) -> SheetGrid {
        let width = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                (0..width)
                    .map(|i| row.get(i).map(|c| c.trim().to_string()).unwrap_or_default())
                    .collect()
            })
            .collect();

        let keep_columns: Vec<usize> = (0..width)
            .filter(|&col| cells.iter().any(|row| !row[col].is_empty()))
            .collect();

        let rows = cells
            .into_iter()
            .map(|row| {
                keep_columns
                    .iter()
                    .map(|&col| row[col].clone())
                    .collect::<Vec<_>>()
            })
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect();

        SheetGrid::new(self.name.clone(), rows)
    }

    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    pub fn data_rows(&self) -> &[Vec<String>] {
        if self.rows.is_empty() {
            &[]
        } else {
            &self.rows[1..]
        }
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read every sheet of a workbook (xlsx, xls, ods) as untrimmed grids
pub fn read_workbook_sheets(path: &Path) -> Result<Vec<SheetGrid>, DocxError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| DocxError::SpreadsheetError(e.to_string()))?;

    let mut grids = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| DocxError::SpreadsheetError(format!("{}: {}", name, e)))?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();
        debug!("Read sheet '{}' ({} rows)", name, rows.len());
        grids.push(SheetGrid::new(name, rows));
    }
    Ok(grids)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}
