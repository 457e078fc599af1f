//! Settings file and vendor credentials

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use cloud_integrations::dropbox::DropboxConfig;
use cloud_integrations::mural::{MuralConfig, DEFAULT_REDIRECT_URI, MURAL_API_BASE};
use narrative_gen::client::{DEFAULT_API_URL, DEFAULT_MODEL};
use serde::Deserialize;
use serde_json::Value;
use shared_types::ReportMetadata;
use tracing::{info, warn};

/// Contents of `settings.json`. Every field is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Metadata used when the uploaded JSON leaves a field out
    pub default_metadata: serde_json::Map<String, Value>,
    /// Exact template text → replacement, applied with the placeholders
    pub heading_overrides: BTreeMap<String, String>,
    pub image_width_inches: f64,
    pub logo_width_inches: f64,
    pub max_retries: u32,
    pub dropbox_folder: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_metadata: serde_json::Map::new(),
            heading_overrides: BTreeMap::new(),
            image_width_inches: 6.0,
            logo_width_inches: 1.5,
            max_retries: narrative_gen::DEFAULT_MAX_RETRIES,
            dropbox_folder: None,
        }
    }
}

impl Settings {
    /// Read `path`; a missing file gives the defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        info!(
            "Loaded settings from {} ({} default metadata fields, {} heading overrides)",
            path.display(),
            settings.default_metadata.len(),
            settings.heading_overrides.len()
        );
        Ok(settings)
    }

    pub fn default_metadata(&self) -> ReportMetadata {
        match ReportMetadata::from_json_value(&Value::Object(self.default_metadata.clone())) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Ignoring default metadata: {}", e);
                ReportMetadata::new()
            }
        }
    }
}

/// Secrets read once from the environment at startup
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_api_url: String,
    pub dropbox: DropboxConfig,
    pub mural: MuralConfig,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Credentials {
    pub fn from_env() -> Self {
        let dropbox = DropboxConfig {
            app_key: var("DROPBOX_APP_KEY").unwrap_or_default(),
            app_secret: var("DROPBOX_APP_SECRET").unwrap_or_default(),
            refresh_token: var("DROPBOX_REFRESH_TOKEN"),
            access_token: var("DROPBOX_TOKEN"),
            folder: var("DROPBOX_FOLDER").unwrap_or_else(|| "/Reports".to_string()),
        };

        let mural = MuralConfig {
            client_id: var("MURAL_CLIENT_ID").unwrap_or_default(),
            client_secret: var("MURAL_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri: var("MURAL_REDIRECT_URI")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            access_token: var("MURAL_ACCESS_TOKEN"),
            refresh_token: var("MURAL_REFRESH_TOKEN"),
            mural_id: var("MURAL_ID"),
            mural_title: var("MURAL_TITLE").unwrap_or_else(|| "Mural".to_string()),
            api_base: MURAL_API_BASE.to_string(),
        };

        Self {
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_api_url: var("GEMINI_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            dropbox,
            mural,
        }
    }
}

/// On-disk layout under the data root
#[derive(Debug, Clone)]
pub struct Directories {
    pub uploaded: PathBuf,
    pub output: PathBuf,
    pub cache: PathBuf,
    pub mural_data: PathBuf,
}

impl Directories {
    pub fn under(root: &Path) -> Self {
        Self {
            uploaded: root.join("uploaded"),
            output: root.join("output"),
            cache: root.join("cache"),
            mural_data: root.join("mural_data"),
        }
    }

    pub fn create_all(&self) -> std::io::Result<()> {
        for dir in [&self.uploaded, &self.output, &self.cache, &self.mural_data] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache.join("narrative_cache.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_settings_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.logo_width_inches, 1.5);
        assert!(settings.default_metadata().is_empty());
    }

    #[test]
    fn test_partial_settings_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"default_metadata": {"client_location": "Devon", "projection_year": 2050},
                "heading_overrides": {"Appendix 6": "Appendix 7"}}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.image_width_inches, 6.0);
        assert_eq!(settings.heading_overrides["Appendix 6"], "Appendix 7");
        let metadata = settings.default_metadata();
        assert_eq!(metadata.get("client_location"), Some("Devon"));
        assert_eq!(metadata.get("projection_year"), Some("2050"));
    }

    #[test]
    fn test_invalid_settings_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
