//! Data-driven table formatting
//!
//! Every named table region in a report template is filled the same way:
//! a spreadsheet sheet is read into a [`SheetGrid`], trimmed, and rendered
//! with the [`TableStyle`] registered under the region's name.

pub mod builder;
pub mod grid;
pub mod style;

pub use builder::{build_table, insert_table_at};
pub use grid::{read_workbook_sheets, SheetGrid};
pub use style::{list_table_styles, style_for, Alignment, TableStyle};
