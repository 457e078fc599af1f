//! Shared application state

use std::sync::Arc;

use chrono::{Duration, Utc};
use cloud_integrations::{DropboxClient, MuralConfig};
use dashmap::DashMap;
use narrative_gen::{
    GateConfig, GeminiClient, GeminiConfig, NarrativeCache, NarrativeGenerator, RateGate,
    TextGenerator,
};
use shared_types::TaskProgress;
use tracing::{debug, info, warn};

use crate::config::{Credentials, Directories, Settings};

/// Everything a request handler or background worker needs. Cloning is
/// cheap; all members are shared.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<NarrativeGenerator>,
    pub dropbox: Option<Arc<DropboxClient>>,
    pub mural: Arc<MuralConfig>,
    pub progress: Arc<DashMap<String, TaskProgress>>,
    pub dirs: Arc<Directories>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        dirs: Directories,
        settings: Settings,
        credentials: Credentials,
        gate_config: GateConfig,
    ) -> anyhow::Result<Self> {
        let gate = match &credentials.gemini_api_key {
            Some(key) => {
                let mut config = GeminiConfig::new(key.clone());
                config.model = credentials.gemini_model.clone();
                config.api_url = credentials.gemini_api_url.clone();
                info!(
                    "Text generation enabled ({}, {} requests/minute)",
                    config.model, gate_config.requests_per_minute
                );
                let client: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(config)?);
                Some(Arc::new(RateGate::new(client, gate_config)))
            }
            None => {
                warn!("GEMINI_API_KEY not set; narratives will use templates and fallbacks");
                None
            }
        };

        let cache = Arc::new(NarrativeCache::load(dirs.cache_file()));
        Self::with_parts(dirs, settings, credentials, gate, cache)
    }

    /// Assemble state from an existing gate and cache
    pub fn with_parts(
        dirs: Directories,
        settings: Settings,
        mut credentials: Credentials,
        gate: Option<Arc<RateGate>>,
        cache: Arc<NarrativeCache>,
    ) -> anyhow::Result<Self> {
        dirs.create_all()?;

        let generator =
            NarrativeGenerator::new(cache, gate).with_max_retries(settings.max_retries);

        if let Some(folder) = &settings.dropbox_folder {
            credentials.dropbox.folder = folder.clone();
        }
        let dropbox = if credentials.dropbox.is_configured() {
            info!("Dropbox upload enabled (folder {})", credentials.dropbox.folder);
            Some(Arc::new(DropboxClient::new(credentials.dropbox)?))
        } else {
            info!("Dropbox credentials not set; cloud upload disabled");
            None
        };

        Ok(Self {
            generator: Arc::new(generator),
            dropbox,
            mural: Arc::new(credentials.mural),
            progress: Arc::new(DashMap::new()),
            dirs: Arc::new(dirs),
            settings: Arc::new(settings),
        })
    }

    pub fn set_progress(&self, task_id: &str, progress: TaskProgress) {
        self.progress.insert(task_id.to_string(), progress);
    }

    pub fn progress_of(&self, task_id: &str) -> Option<TaskProgress> {
        self.progress.get(task_id).map(|entry| entry.value().clone())
    }

    /// Drop finished tasks last updated more than `max_age` ago. Queued and
    /// running tasks are kept whatever their age.
    pub fn evict_finished(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let before = self.progress.len();
        self.progress
            .retain(|_, progress| !progress.status.is_terminal() || progress.updated_at > cutoff);
        let evicted = before.saturating_sub(self.progress.len());
        if evicted > 0 {
            debug!("Evicted {} finished tasks from the progress map", evicted);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state(root: &std::path::Path) -> AppState {
        AppState::with_parts(
            Directories::under(root),
            Settings::default(),
            Credentials::default(),
            None,
            Arc::new(NarrativeCache::in_memory()),
        )
        .unwrap()
    }

    #[test]
    fn test_evict_finished_keeps_recent_and_running() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let old = Utc::now() - Duration::hours(3);

        let mut stale_done = TaskProgress::completed("old.docx");
        stale_done.updated_at = old;
        let mut stale_failed = TaskProgress::failed(30, "Error: boom");
        stale_failed.updated_at = old;
        let mut stale_running = TaskProgress::running(50, "Formatting tables");
        stale_running.updated_at = old;

        state.set_progress("stale-done", stale_done);
        state.set_progress("stale-failed", stale_failed);
        state.set_progress("stale-running", stale_running);
        state.set_progress("fresh-done", TaskProgress::completed("new.docx"));

        assert_eq!(state.evict_finished(Duration::hours(1)), 2);
        assert!(state.progress_of("stale-done").is_none());
        assert!(state.progress_of("stale-failed").is_none());
        assert!(state.progress_of("stale-running").is_some());
        assert!(state.progress_of("fresh-done").is_some());
    }
}
