//! Word document engine
//!
//! This crate provides the rich-document layer of the report generator:
//! - Loading and saving `.docx` packages, with a blank-document fallback
//! - Placeholder substitution across body, tables, headers and footers
//! - Data-driven table formatting from spreadsheet grids
//! - Narrative paragraph and image insertion at marker paragraphs
//!
//! Every mutation works on an in-memory [`Document`] owned by one caller;
//! nothing here is shared between threads.

pub mod content;
pub mod document;
pub mod errors;
pub mod images;
pub mod package;
pub mod paragraph;
pub mod placeholders;
pub mod tables;
pub mod xml;

mod blank;

pub use content::insert_paragraphs_at;
pub use document::Document;
pub use errors::DocxError;
pub use images::insert_image_at;
pub use placeholders::{find_unresolved_markers, replace_placeholders, SubstitutionReport};
pub use tables::{insert_table_at, list_table_styles, style_for, SheetGrid, TableStyle};
