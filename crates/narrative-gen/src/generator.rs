//! Tiered narrative generation
//!
//! Tiers are tried in order and the first that yields text wins:
//! cache, text API (through the rate gate), static template, fallback.

use std::sync::Arc;

use serde::Serialize;
use shared_types::{NarrativeSource, ReportMetadata};
use tracing::{info, warn};

use crate::cache::NarrativeCache;
use crate::gate::RateGate;
use crate::templates::{build_prompt, fallback_text, render_template};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Generated text for one section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narrative {
    pub key: String,
    pub content: String,
    pub source: NarrativeSource,
}

pub struct NarrativeGenerator {
    cache: Arc<NarrativeCache>,
    gate: Option<Arc<RateGate>>,
    max_retries: u32,
}

impl NarrativeGenerator {
    /// `gate` is `None` when no text API is configured
    pub fn new(cache: Arc<NarrativeCache>, gate: Option<Arc<RateGate>>) -> Self {
        Self {
            cache,
            gate,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn ai_available(&self) -> bool {
        self.gate.is_some()
    }

    pub fn cache(&self) -> &NarrativeCache {
        &self.cache
    }

    /// Produce text for `key`. Never fails: the last tier always has text.
    pub async fn generate_narrative(
        &self,
        key: &str,
        metadata: &ReportMetadata,
        prompt_override: Option<&str>,
        use_ai: bool,
    ) -> Narrative {
        let prompt = build_prompt(key, metadata, prompt_override);

        if let Some(content) = self.cache.get(key, &prompt) {
            info!("Narrative '{}' served from cache", key);
            return Narrative::new(key, content, NarrativeSource::Cache);
        }

        if use_ai {
            if let Some(gate) = &self.gate {
                if let Some(content) = gate.generate(&prompt, self.max_retries).await {
                    self.cache.insert(key, &prompt, &content, NarrativeSource::Ai);
                    if let Err(e) = self.cache.save() {
                        warn!("Could not persist narrative cache: {}", e);
                    }
                    info!("Narrative '{}' generated ({} characters)", key, content.len());
                    return Narrative::new(key, content, NarrativeSource::Ai);
                }
            }
        }

        if let Some(content) = render_template(key, metadata) {
            info!("Narrative '{}' rendered from static template", key);
            return Narrative::new(key, content, NarrativeSource::Template);
        }

        warn!("Narrative '{}' using hard-coded fallback", key);
        Narrative::new(key, fallback_text(key), NarrativeSource::Fallback)
    }
}

impl Narrative {
    fn new(key: &str, content: String, source: NarrativeSource) -> Self {
        Self {
            key: key.to_string(),
            content,
            source,
        }
    }
}
