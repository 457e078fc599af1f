//! API handlers for the report server
//!
//! Provides REST endpoints for:
//! - Report submission and progress polling
//! - Report download
//! - Whiteboard extraction and status
//! - Upload directory cleanup

use std::path::Path;

use axum::{
    extract::{Multipart, Path as UrlPath, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use cloud_integrations::mural::{extract_to_files, report_status, MuralClient, MuralStatus};
use serde::Serialize;
use shared_types::TaskProgress;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::ServerError;
use crate::pipeline::{run_report, JobFile, ReportJob};
use crate::state::AppState;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "report-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Response for requests that start background work
#[derive(Serialize)]
pub struct TaskAccepted {
    pub success: bool,
    pub task_id: String,
}

/// Checkbox values browsers and scripts send for "on"
pub fn is_checked(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "1" | "yes"
    )
}

/// Plain file name with no directory components
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
        && name != "."
}

/// Keep the base name of a browser-supplied file name
fn clean_upload_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

async fn save_upload(dir: &Path, original: &str, data: &[u8]) -> Result<JobFile, ServerError> {
    let original_name = clean_upload_name(original);
    let path = dir.join(format!("{}_{}", Uuid::new_v4(), original_name));
    tokio::fs::write(&path, data).await?;
    debug!("Saved upload {} ({} bytes)", path.display(), data.len());
    Ok(JobFile {
        path,
        original_name,
    })
}

/// Handler: POST /process
pub async fn handle_process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TaskAccepted>), ServerError> {
    let mut job = ReportJob::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        match file_name {
            Some(file_name) => {
                let data = field.bytes().await?;
                if file_name.is_empty() || data.is_empty() {
                    continue;
                }
                let saved = save_upload(&state.dirs.uploaded, &file_name, &data).await?;
                match name.as_str() {
                    "template" => job.template = Some(saved),
                    "json_file" => job.metadata_file = Some(saved),
                    "images" => job.images.push(saved),
                    "excel_files" => job.excel_files.push(saved),
                    "logo" => job.logo = Some(saved),
                    "client_logo" => job.client_logo = Some(saved),
                    other => debug!("Ignoring file field '{}'", other),
                }
            }
            None => {
                let value = field.text().await?;
                match name.as_str() {
                    "use_ai" => job.use_ai = is_checked(&value),
                    "upload_to_cloud" => job.upload_to_cloud = is_checked(&value),
                    "include_mural" => job.include_mural = is_checked(&value),
                    other => match other.strip_prefix("prompt_") {
                        Some(key) if !key.is_empty() && !value.trim().is_empty() => {
                            job.prompt_overrides.insert(key.to_string(), value);
                        }
                        _ => debug!("Ignoring form field '{}'", other),
                    },
                }
            }
        }
    }

    let task_id = Uuid::new_v4().to_string();
    info!(
        "Report {} submitted (template: {}, {} images, {} spreadsheets, ai: {}, upload: {}, whiteboard: {})",
        task_id,
        job.template.is_some(),
        job.images.len(),
        job.excel_files.len(),
        job.use_ai,
        job.upload_to_cloud,
        job.include_mural
    );

    state.set_progress(&task_id, TaskProgress::queued());
    tokio::spawn(run_report(state.clone(), task_id.clone(), job));

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            success: true,
            task_id,
        }),
    ))
}

/// Handler: GET /progress/:task_id
pub async fn handle_progress(
    State(state): State<AppState>,
    UrlPath(task_id): UrlPath<String>,
) -> Result<Json<TaskProgress>, ServerError> {
    state
        .progress_of(&task_id)
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("task '{}'", task_id)))
}

/// Handler: GET /download/:filename
pub async fn handle_download(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<impl IntoResponse, ServerError> {
    if !is_safe_file_name(&filename) {
        return Err(ServerError::InvalidRequest(format!(
            "invalid file name '{}'",
            filename
        )));
    }

    let path = state.dirs.output.join(&filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ServerError::NotFound(format!("report '{}'", filename)));
        }
        Err(e) => return Err(e.into()),
    };

    info!("Serving {} ({} bytes)", filename, bytes.len());
    Ok((
        [
            (header::CONTENT_TYPE, DOCX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}

/// Handler: POST /mural/extract
pub async fn handle_mural_extract(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TaskAccepted>), ServerError> {
    let config = state.mural.as_ref().clone();
    let Some(mural_id) = config.mural_id.clone().filter(|_| config.can_fetch()) else {
        return Err(ServerError::NotConfigured("Mural board access".to_string()));
    };
    let client = MuralClient::new(config).map_err(|e| ServerError::Internal(e.to_string()))?;

    let task_id = Uuid::new_v4().to_string();
    state.set_progress(&task_id, TaskProgress::running(10, "Fetching whiteboard"));
    info!("Whiteboard extraction {} started for board {}", task_id, mural_id);

    let worker_state = state.clone();
    let worker_id = task_id.clone();
    tokio::spawn(async move {
        let title = client.config().mural_title.clone();
        let out_dir = worker_state.dirs.mural_data.clone();
        match extract_to_files(&client, &mural_id, &title, &out_dir).await {
            Ok(extraction) => {
                info!(
                    "Whiteboard extraction {} finished: {} notes",
                    worker_id, extraction.notes_total
                );
                let excel = extraction
                    .excel_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                worker_state.set_progress(&worker_id, TaskProgress::completed(excel));
            }
            Err(e) => {
                error!("Whiteboard extraction {} failed: {}", worker_id, e);
                worker_state
                    .set_progress(&worker_id, TaskProgress::failed(10, format!("Error: {}", e)));
            }
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted {
            success: true,
            task_id,
        }),
    ))
}

/// Handler: GET /mural/status
pub async fn handle_mural_status(State(state): State<AppState>) -> Json<MuralStatus> {
    Json(report_status(&state.dirs.mural_data))
}

/// Clear uploads response
#[derive(Serialize)]
pub struct ClearUploadsResponse {
    pub success: bool,
    pub removed: usize,
}

/// Handler: POST /clear-uploads
pub async fn handle_clear_uploads(
    State(state): State<AppState>,
) -> Result<Json<ClearUploadsResponse>, ServerError> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(&state.dirs.uploaded).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    info!("Cleared {} uploaded files", removed);
    Ok(Json(ClearUploadsResponse {
        success: true,
        removed,
    }))
}
