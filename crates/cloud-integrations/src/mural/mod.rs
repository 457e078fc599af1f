//! Mural whiteboard extraction

pub mod client;
pub mod export;
pub mod oauth;
pub mod widgets;

use std::path::{Path, PathBuf};

use tracing::info;

pub use client::{MuralClient, MuralConfig, DEFAULT_REDIRECT_URI, MURAL_API_BASE, MURAL_SCOPES};
pub use export::{
    load_report_json, render_text_report, report_status, write_excel, write_report_json,
    write_text_report, MuralReport, MuralStatus, REPORT_JSON_FILE, TEXT_REPORT_FILE,
};
pub use oauth::{wait_for_callback, CALLBACK_TIMEOUT};
pub use widgets::{organize, process_widgets, NoteColor, OrganizedNotes, StickyNote};

use crate::errors::IntegrationError;

/// Result of one board extraction
#[derive(Debug, Clone)]
pub struct MuralExtraction {
    pub report: MuralReport,
    pub json_path: PathBuf,
    pub excel_path: PathBuf,
    pub text_path: PathBuf,
    pub notes_total: usize,
}

/// Fetch a board, classify its notes and write the JSON/Excel pair plus
/// the text report into `out_dir`
pub async fn extract_to_files(
    client: &MuralClient,
    mural_id: &str,
    title: &str,
    out_dir: &Path,
) -> Result<MuralExtraction, IntegrationError> {
    let widgets = client.fetch_widgets(mural_id).await?;
    let notes = organize(process_widgets(&widgets));
    info!(
        "Board {}: {} notes ({} uncategorized)",
        mural_id,
        notes.total(),
        notes.other.len()
    );

    let report = MuralReport::from_notes(&notes);
    let json_path = write_report_json(&report, out_dir)?;
    let excel_path = write_excel(&notes, title, out_dir)?;
    let text_path = write_text_report(&notes, mural_id, title, &excel_path, out_dir)?;

    Ok(MuralExtraction {
        report,
        json_path,
        excel_path,
        text_path,
        notes_total: notes.total(),
    })
}
