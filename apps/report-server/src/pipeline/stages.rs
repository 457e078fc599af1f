//! The report stages, in pipeline order

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use cloud_integrations::mural::{load_report_json, REPORT_JSON_FILE};
use docx_engine::tables::read_workbook_sheets;
use docx_engine::{
    find_unresolved_markers, insert_image_at, insert_paragraphs_at, insert_table_at,
    replace_placeholders, style_for, Document, SheetGrid,
};
use shared_types::{NarrativeKey, ReportMetadata};
use tracing::{debug, info, warn};

use super::{JobFile, PipelineContext, ReportStage, StageError};

pub const MURAL_RISKS_TABLE: &str = "mural_table1";
pub const MURAL_RAPA_TABLE: &str = "mural_rapa";

pub fn narrative_marker(key: &str) -> String {
    format!("[[narrative:{}]]", key)
}

pub fn table_marker(name: &str) -> String {
    format!("[[table:{}]]", name)
}

pub fn image_marker(name: &str) -> String {
    format!("[[image:{}]]", name)
}

/// The full pipeline, in order
pub fn default_stages() -> Vec<Box<dyn ReportStage>> {
    vec![
        Box::new(LoadTemplate),
        Box::new(LoadMetadata),
        Box::new(Narratives),
        Box::new(SpreadsheetTables),
        Box::new(WhiteboardTables),
        Box::new(Images),
        Box::new(Placeholders),
        Box::new(UnresolvedMarkers),
        Box::new(SaveDocument),
        Box::new(CloudUpload),
    ]
}

/// Sets `ctx.document` from the uploaded template, or a blank document
pub struct LoadTemplate;

#[async_trait]
impl ReportStage for LoadTemplate {
    fn name(&self) -> &'static str {
        "Loading template"
    }

    fn percent(&self) -> u8 {
        5
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let template = ctx.job.template.as_ref().map(|f| f.path.as_path());
        let (document, blank) = Document::open_or_blank(template)?;
        if blank {
            warn!("[{}] Using a blank document", ctx.task_id);
        }
        ctx.document = Some(document);
        Ok(())
    }
}

/// Layers the uploaded JSON over the default metadata
pub struct LoadMetadata;

#[async_trait]
impl ReportStage for LoadMetadata {
    fn name(&self) -> &'static str {
        "Reading project metadata"
    }

    fn percent(&self) -> u8 {
        10
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let Some(file) = &ctx.job.metadata_file else {
            info!("[{}] No metadata file; using defaults", ctx.task_id);
            return Ok(());
        };
        let raw = tokio::fs::read_to_string(&file.path).await?;
        let uploaded = ReportMetadata::from_json_str(&raw)?;
        info!(
            "[{}] Loaded {} metadata fields from {}",
            ctx.task_id,
            uploaded.len(),
            file.original_name
        );
        ctx.metadata = uploaded.with_defaults(&ctx.metadata);
        Ok(())
    }
}

/// Replaces each `[[narrative:<key>]]` paragraph with generated text
pub struct Narratives;

impl Narratives {
    fn keys(ctx: &PipelineContext) -> Vec<String> {
        let mut keys: Vec<String> = NarrativeKey::ALL
            .iter()
            .map(|k| k.as_str().to_string())
            .collect();
        for key in ctx.job.prompt_overrides.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}

#[async_trait]
impl ReportStage for Narratives {
    fn name(&self) -> &'static str {
        "Generating narrative sections"
    }

    fn percent(&self) -> u8 {
        20
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let generator = ctx.state.generator.clone();
        let keys = Self::keys(ctx);
        let total = keys.len().max(1);

        for (i, key) in keys.iter().enumerate() {
            let marker = narrative_marker(key);
            if ctx.document_mut()?.find_paragraph(&marker).is_none() {
                debug!("[{}] No {} in template", ctx.task_id, marker);
                continue;
            }

            let percent = 20 + (40 * i / total) as u8;
            ctx.report(percent, format!("Writing {}", key.replace('_', " ")));

            let prompt_override = ctx.job.prompt_overrides.get(key).map(String::as_str);
            let narrative = generator
                .generate_narrative(key, &ctx.metadata, prompt_override, ctx.job.use_ai)
                .await;
            info!(
                "[{}] Narrative '{}' from {} ({} chars)",
                ctx.task_id,
                key,
                narrative.source.as_str(),
                narrative.content.len()
            );
            insert_paragraphs_at(ctx.document_mut()?, &marker, &narrative.content);
        }
        Ok(())
    }
}

/// Candidate table names for one sheet: the sheet name, then the file
/// name without extension
fn table_names(grid: &SheetGrid, file: &JobFile) -> Vec<String> {
    let mut names = vec![grid.name.clone()];
    if file.stem() != grid.name {
        names.push(file.stem().to_string());
    }
    names
}

fn insert_named_table(doc: &mut Document, grid: &SheetGrid, names: &[String]) -> Result<bool, StageError> {
    let Some(name) = names
        .iter()
        .find(|name| doc.find_paragraph(&table_marker(name)).is_some())
    else {
        return Ok(false);
    };
    Ok(insert_table_at(doc, &table_marker(name), grid, &style_for(name))?)
}

/// Formats every uploaded spreadsheet sheet into its `[[table:<name>]]`
pub struct SpreadsheetTables;

#[async_trait]
impl ReportStage for SpreadsheetTables {
    fn name(&self) -> &'static str {
        "Formatting tables"
    }

    fn percent(&self) -> u8 {
        65
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let files = ctx.job.excel_files.clone();
        let task_id = ctx.task_id.clone();
        let doc = ctx.document_mut()?;

        let mut inserted = 0;
        for file in &files {
            let grids = match read_workbook_sheets(&file.path) {
                Ok(grids) => grids,
                Err(e) => {
                    warn!("[{}] Skipping {}: {}", task_id, file.original_name, e);
                    continue;
                }
            };
            for grid in grids {
                let names = table_names(&grid, file);
                match insert_named_table(doc, &grid, &names) {
                    Ok(true) => inserted += 1,
                    Ok(false) => debug!("[{}] No marker for sheet '{}'", task_id, grid.name),
                    Err(e) => warn!("[{}] Table '{}' skipped: {}", task_id, grid.name, e),
                }
            }
        }
        info!("[{}] Inserted {} spreadsheet tables", task_id, inserted);
        Ok(())
    }
}

/// Builds the two whiteboard tables from the extracted JSON
pub struct WhiteboardTables;

#[async_trait]
impl ReportStage for WhiteboardTables {
    fn name(&self) -> &'static str {
        "Adding whiteboard tables"
    }

    fn percent(&self) -> u8 {
        72
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        if !ctx.job.include_mural {
            return Ok(());
        }
        let path = ctx.state.dirs.mural_data.join(REPORT_JSON_FILE);
        let report = load_report_json(&path)?;
        let task_id = ctx.task_id.clone();
        let doc = ctx.document_mut()?;

        let tables = [
            (MURAL_RISKS_TABLE, report.has_risks(), report.table1_rows()),
            (MURAL_RAPA_TABLE, report.has_rapa(), report.rapa_rows()),
        ];
        for (name, has_content, rows) in tables {
            if !has_content {
                info!("[{}] Whiteboard table '{}' has no notes", task_id, name);
                continue;
            }
            let grid = SheetGrid::new(name, rows);
            match insert_table_at(doc, &table_marker(name), &grid, &style_for(name)) {
                Ok(true) => {}
                Ok(false) => debug!("[{}] No marker for '{}'", task_id, name),
                Err(e) => warn!("[{}] Table '{}' skipped: {}", task_id, name, e),
            }
        }
        Ok(())
    }
}

async fn place_image(
    doc: &mut Document,
    markers: &[String],
    file: &JobFile,
    width_inches: f64,
) -> Result<bool, StageError> {
    let Some(marker) = markers.iter().find(|m| doc.find_paragraph(m).is_some()) else {
        return Ok(false);
    };
    let bytes = tokio::fs::read(&file.path).await?;
    Ok(insert_image_at(doc, marker, &bytes, &file.original_name, width_inches)?)
}

/// Places uploaded images at `[[image:<name>]]` or `[[image:<n>]]`, and
/// logos at `[[logo]]` and `[[client_logo]]`
pub struct Images;

#[async_trait]
impl ReportStage for Images {
    fn name(&self) -> &'static str {
        "Inserting images"
    }

    fn percent(&self) -> u8 {
        78
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let job = ctx.job.clone();
        let image_width = ctx.state.settings.image_width_inches;
        let logo_width = ctx.state.settings.logo_width_inches;
        let task_id = ctx.task_id.clone();
        let doc = ctx.document_mut()?;

        let mut placements: Vec<(Vec<String>, &JobFile, f64)> = job
            .images
            .iter()
            .enumerate()
            .map(|(i, file)| {
                (
                    vec![image_marker(file.stem()), image_marker(&(i + 1).to_string())],
                    file,
                    image_width,
                )
            })
            .collect();
        if let Some(logo) = &job.logo {
            placements.push((vec!["[[logo]]".to_string()], logo, logo_width));
        }
        if let Some(logo) = &job.client_logo {
            placements.push((vec!["[[client_logo]]".to_string()], logo, logo_width));
        }

        for (markers, file, width) in placements {
            match place_image(doc, &markers, file, width).await {
                Ok(true) => info!("[{}] Placed {}", task_id, file.original_name),
                Ok(false) => warn!("[{}] No marker for image {}", task_id, file.original_name),
                Err(e) => warn!("[{}] Image {} skipped: {}", task_id, file.original_name, e),
            }
        }
        Ok(())
    }
}

/// Substitutes every `[[field]]` and the heading overrides
pub struct Placeholders;

#[async_trait]
impl ReportStage for Placeholders {
    fn name(&self) -> &'static str {
        "Filling placeholders"
    }

    fn percent(&self) -> u8 {
        85
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let mut mapping = ctx.metadata.placeholder_map();
        mapping.extend(
            ctx.state
                .settings
                .heading_overrides
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let task_id = ctx.task_id.clone();
        let report = replace_placeholders(ctx.document_mut()?, &mapping);
        info!(
            "[{}] Replaced {} placeholder occurrences ({} markers found, {} not in template)",
            task_id,
            report.replacements(),
            report.found.len(),
            report.missing.len()
        );
        debug!("[{}] Not in template: {:?}", task_id, report.missing);
        Ok(())
    }
}

/// Logs any `[[...]]` left after every substitution pass
pub struct UnresolvedMarkers;

#[async_trait]
impl ReportStage for UnresolvedMarkers {
    fn name(&self) -> &'static str {
        "Checking for unresolved markers"
    }

    fn percent(&self) -> u8 {
        88
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let task_id = ctx.task_id.clone();
        let unresolved = find_unresolved_markers(ctx.document_mut()?);
        if !unresolved.is_empty() {
            warn!(
                "[{}] {} unresolved markers: {:?}",
                task_id,
                unresolved.len(),
                unresolved
            );
        }
        Ok(())
    }
}

pub fn output_file_name(task_id: &str) -> String {
    let short: String = task_id.chars().filter(|c| *c != '-').take(8).collect();
    format!(
        "Climate_Adaptation_Plan_{}_{}.docx",
        Utc::now().format("%Y%m%d_%H%M%S"),
        short
    )
}

/// Writes the document into `output/`
pub struct SaveDocument;

#[async_trait]
impl ReportStage for SaveDocument {
    fn name(&self) -> &'static str {
        "Saving report"
    }

    fn percent(&self) -> u8 {
        92
    }

    fn is_fatal(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let path = ctx.state.dirs.output.join(output_file_name(&ctx.task_id));
        ctx.document_mut()?.save(&path)?;
        info!("[{}] Saved {}", ctx.task_id, path.display());
        ctx.output_path = Some(path);
        Ok(())
    }
}

/// Uploads the saved report when requested and configured
pub struct CloudUpload;

#[async_trait]
impl ReportStage for CloudUpload {
    fn name(&self) -> &'static str {
        "Uploading to cloud storage"
    }

    fn percent(&self) -> u8 {
        96
    }

    async fn run(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        if !ctx.job.upload_to_cloud {
            return Ok(());
        }
        let Some(dropbox) = ctx.state.dropbox.clone() else {
            warn!("[{}] Cloud upload requested but Dropbox is not configured", ctx.task_id);
            return Ok(());
        };
        let Some(path) = ctx.output_path.clone() else {
            return Err(StageError::NoOutput);
        };

        let name = file_name(&path);
        let uploaded = dropbox.upload_file(&path, &name).await?;
        info!(
            "[{}] Uploaded to Dropbox: {}",
            ctx.task_id,
            uploaded.path_display.as_deref().unwrap_or(&uploaded.name)
        );
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, Directories, Settings};
    use crate::pipeline::{run_pipeline, ReportJob};
    use crate::state::AppState;
    use narrative_gen::{GateConfig, GenerationError, NarrativeCache, RateGate, TextGenerator};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Arc;

    const AI_TEXT: &str = "Acme Farm will respond to rising temperatures by investing in shade, \
                           water storage and staff training over the next five years.";

    struct CannedGenerator;

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate_text(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok(AI_TEXT.to_string())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn state(root: &Path, gate: Option<Arc<RateGate>>) -> AppState {
        let settings = Settings {
            heading_overrides: [("Appendix 6".to_string(), "Appendix 7".to_string())].into(),
            ..Settings::default()
        };
        AppState::with_parts(
            Directories::under(root),
            settings,
            Credentials::default(),
            gate,
            Arc::new(NarrativeCache::in_memory()),
        )
        .unwrap()
    }

    fn job_file(dir: &Path, name: &str, bytes: &[u8]) -> JobFile {
        let path = dir.join(format!("test_{}", name));
        std::fs::write(&path, bytes).unwrap();
        JobFile {
            path,
            original_name: name.to_string(),
        }
    }

    fn template(dir: &Path, lines: &[&str]) -> JobFile {
        let mut doc = Document::blank().unwrap();
        for line in lines {
            doc.append_paragraph(line);
        }
        job_file(dir, "template.docx", &doc.to_bytes().unwrap())
    }

    fn saved(output: &Option<PathBuf>) -> Document {
        Document::open(output.as_ref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_full_pipeline_fills_template() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None);

        let job = ReportJob {
            template: Some(template(
                dir.path(),
                &[
                    "Appendix 6",
                    "Report for [[client_name]] in [[client_location]]",
                    "[[narrative:conclusion]]",
                    "Prepared [[report_year]]",
                ],
            )),
            metadata_file: Some(job_file(
                dir.path(),
                "meta.json",
                br#"{"client_name": "Acme Farm", "client_location": "Devon"}"#,
            )),
            ..ReportJob::default()
        };

        let mut ctx = PipelineContext::new("task-1", job, state);
        let file_name = run_pipeline(&mut ctx, &default_stages()).await.unwrap();
        assert!(file_name.starts_with("Climate_Adaptation_Plan_"));
        assert!(file_name.ends_with("_task1.docx"));

        let text = saved(&ctx.output_path).full_text();
        assert!(text.contains("Appendix 7"));
        assert!(text.contains("Report for Acme Farm in Devon"));
        assert!(text.contains("By acting on this plan, Acme Farm is taking practical steps"));
        assert!(text.contains(&format!("Prepared {}", Utc::now().format("%Y"))));
        assert!(!text.contains("[["));
    }

    #[tokio::test]
    async fn test_ai_narrative_is_used_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(RateGate::new(
            Arc::new(CannedGenerator),
            GateConfig {
                requests_per_minute: 600,
                ..GateConfig::default()
            },
        ));
        let state = state(dir.path(), Some(gate));

        let job = ReportJob {
            template: Some(template(dir.path(), &["[[narrative:adaptation_strategy]]"])),
            use_ai: true,
            ..ReportJob::default()
        };

        let mut ctx = PipelineContext::new("task-2", job, state.clone());
        run_pipeline(&mut ctx, &default_stages()).await.unwrap();

        assert!(saved(&ctx.output_path).full_text().contains(AI_TEXT));
        assert_eq!(state.generator.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_template_falls_back_to_blank() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None);
        let job = ReportJob {
            template: Some(JobFile {
                path: dir.path().join("absent.docx"),
                original_name: "absent.docx".to_string(),
            }),
            metadata_file: Some(job_file(dir.path(), "meta.json", b"[1, 2]")),
            ..ReportJob::default()
        };

        let mut ctx = PipelineContext::new("task-3", job, state);
        let file_name = run_pipeline(&mut ctx, &default_stages()).await.unwrap();
        assert!(ctx.state.dirs.output.join(file_name).exists());
    }

    #[tokio::test]
    async fn test_whiteboard_tables_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None);
        std::fs::write(
            state.dirs.mural_data.join(REPORT_JSON_FILE),
            serde_json::json!({
                "table1": {"title": "Risks from climate change", "columns": [
                    {"header": "Current", "content": ["Heat stress", "Drought"], "color": "Yellow"},
                    {"header": "Future", "content": ["Crop loss"], "color": "Dark Red"},
                    {"header": "Actions", "content": [], "color": "Orange"}
                ]},
                "table2": {"title": "RAPA",
                    "adaptation_actions": {"content": [], "color": "Green"},
                    "assumptions": {"content": [], "color": "Blue"}}
            })
            .to_string(),
        )
        .unwrap();

        let job = ReportJob {
            template: Some(template(
                dir.path(),
                &["[[table:mural_table1]]", "[[table:mural_rapa]]"],
            )),
            include_mural: true,
            ..ReportJob::default()
        };
        let mut ctx = PipelineContext::new("task-4", job, state);
        run_pipeline(&mut ctx, &default_stages()).await.unwrap();

        let doc = saved(&ctx.output_path);
        assert_eq!(doc.tables().len(), 1);
        let text = doc.full_text();
        assert!(text.contains("Heat stress"));
        assert!(text.contains("[[table:mural_rapa]]"));
    }

    #[tokio::test]
    async fn test_spreadsheet_sheet_fills_named_marker() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None);

        let xlsx = dir.path().join("test_risks.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet().set_name("table-3_a").unwrap();
        sheet.write_string(0, 0, "Hazard").unwrap();
        sheet.write_string(0, 1, "Rating").unwrap();
        sheet.write_string(1, 0, "Heatwave").unwrap();
        sheet.write_string(1, 1, "High").unwrap();
        workbook.save(&xlsx).unwrap();

        let job = ReportJob {
            template: Some(template(dir.path(), &["Risks", "[[table:table-3_a]]"])),
            excel_files: vec![JobFile {
                path: xlsx,
                original_name: "risks.xlsx".to_string(),
            }],
            ..ReportJob::default()
        };
        let mut ctx = PipelineContext::new("task-6", job, state);
        run_pipeline(&mut ctx, &default_stages()).await.unwrap();

        let doc = saved(&ctx.output_path);
        assert_eq!(doc.tables().len(), 1);
        let text = doc.full_text();
        assert!(text.contains("Heatwave"));
        assert!(!text.contains("[[table:"));
    }

    #[tokio::test]
    async fn test_upload_without_dropbox_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), None);
        let job = ReportJob {
            upload_to_cloud: true,
            ..ReportJob::default()
        };
        let mut ctx = PipelineContext::new("task-5", job, state);
        assert!(run_pipeline(&mut ctx, &default_stages()).await.is_ok());
    }

    #[test]
    fn test_table_names_prefer_sheet_name() {
        let grid = SheetGrid::new("table-3_a", vec![]);
        let file = JobFile {
            path: PathBuf::from("x"),
            original_name: "risks.xlsx".to_string(),
        };
        assert_eq!(table_names(&grid, &file), vec!["table-3_a", "risks"]);
    }
}
