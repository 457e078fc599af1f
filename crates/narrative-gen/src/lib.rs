//! Narrative generation for adaptation plan reports
//!
//! Provides:
//! - A rate-limited gate in front of the external text API, shared by
//!   every concurrent report
//! - A Gemini-style HTTP client behind the [`TextGenerator`] trait
//! - A persistent content cache keyed by section and prompt
//! - Static templates and hard-coded fallbacks so every section always
//!   receives text

pub mod cache;
pub mod client;
pub mod errors;
pub mod gate;
pub mod generator;
pub mod templates;

pub use cache::NarrativeCache;
pub use client::{GeminiClient, GeminiConfig, TextGenerator};
pub use errors::GenerationError;
pub use gate::{GateConfig, RateGate};
pub use generator::{Narrative, NarrativeGenerator, DEFAULT_MAX_RETRIES};
pub use templates::build_prompt;
