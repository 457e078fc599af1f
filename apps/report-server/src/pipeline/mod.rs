//! Report pipeline
//!
//! A report is built by an explicit, ordered list of [`ReportStage`]s, each
//! mutating the [`PipelineContext`] in place. A failing stage is logged and
//! skipped; only a stage marked fatal (saving the document) ends the run.

pub mod stages;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use docx_engine::{Document, DocxError};
use shared_types::{MetadataError, ReportMetadata, TaskProgress};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::state::AppState;

pub use stages::default_stages;

/// Errors a stage can report
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Document error: {0}")]
    Docx(#[from] DocxError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Cloud error: {0}")]
    Integration(#[from] cloud_integrations::IntegrationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No document is loaded")]
    NoDocument,

    #[error("Pipeline finished without producing a report")]
    NoOutput,
}

/// A file saved from the upload form
#[derive(Debug, Clone)]
pub struct JobFile {
    pub path: PathBuf,
    /// Name the browser sent, without the unique prefix
    pub original_name: String,
}

impl JobFile {
    /// Original name without its extension
    pub fn stem(&self) -> &str {
        self.original_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.original_name)
    }
}

/// One report request, as submitted
#[derive(Debug, Clone, Default)]
pub struct ReportJob {
    pub template: Option<JobFile>,
    pub metadata_file: Option<JobFile>,
    pub images: Vec<JobFile>,
    pub excel_files: Vec<JobFile>,
    pub logo: Option<JobFile>,
    pub client_logo: Option<JobFile>,
    /// Narrative key → prompt text replacing the default prompt
    pub prompt_overrides: BTreeMap<String, String>,
    pub use_ai: bool,
    pub upload_to_cloud: bool,
    pub include_mural: bool,
}

/// Mutable state threaded through the stages of one run
pub struct PipelineContext {
    pub task_id: String,
    pub job: ReportJob,
    pub state: AppState,
    pub document: Option<Document>,
    pub metadata: ReportMetadata,
    pub output_path: Option<PathBuf>,
}

impl PipelineContext {
    /// Metadata starts as the settings defaults plus computed date fields
    pub fn new(task_id: impl Into<String>, job: ReportJob, state: AppState) -> Self {
        let mut metadata = state.settings.default_metadata();
        let now = Utc::now();
        metadata.set("report_date", now.format("%d %B %Y").to_string());
        metadata.set("report_year", now.format("%Y").to_string());

        Self {
            task_id: task_id.into(),
            job,
            state,
            document: None,
            metadata,
            output_path: None,
        }
    }

    pub fn document_mut(&mut self) -> Result<&mut Document, StageError> {
        self.document.as_mut().ok_or(StageError::NoDocument)
    }

    pub fn report(&self, percent: u8, message: impl Into<String>) {
        self.state
            .set_progress(&self.task_id, TaskProgress::running(percent, message));
    }
}

/// One pass over the report
#[async_trait]
pub trait ReportStage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Progress percentage shown while the stage runs
    fn percent(&self) -> u8;

    /// A fatal stage's failure ends the run
    fn is_fatal(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError>;
}

/// Run `stages` in order and return the saved report's file name
pub async fn run_pipeline(
    ctx: &mut PipelineContext,
    stages: &[Box<dyn ReportStage>],
) -> Result<String, StageError> {
    for stage in stages {
        ctx.report(stage.percent(), stage.name());
        match stage.run(ctx).await {
            Ok(()) => {}
            Err(e) if stage.is_fatal() => {
                error!("[{}] Stage '{}' failed: {}", ctx.task_id, stage.name(), e);
                return Err(e);
            }
            Err(e) => warn!(
                "[{}] Stage '{}' failed, continuing: {}",
                ctx.task_id,
                stage.name(),
                e
            ),
        }
    }

    ctx.output_path
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .ok_or(StageError::NoOutput)
}

/// Background worker body: run the whole pipeline and record the outcome
/// in the progress map
pub async fn run_report(state: AppState, task_id: String, job: ReportJob) {
    info!("[{}] Report generation started", task_id);
    let mut ctx = PipelineContext::new(task_id.clone(), job, state.clone());
    let stages = default_stages();

    match run_pipeline(&mut ctx, &stages).await {
        Ok(file_name) => {
            info!("[{}] Report ready: {}", task_id, file_name);
            state.set_progress(&task_id, TaskProgress::completed(file_name));
        }
        Err(e) => {
            let percent = state.progress_of(&task_id).map(|p| p.percent).unwrap_or(0);
            state.set_progress(&task_id, TaskProgress::failed(percent, format!("Error: {}", e)));
        }
    }
}
