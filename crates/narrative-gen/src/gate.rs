//! Rate-limited gate in front of the external text API
//!
//! One gate is shared by every report worker. Calls are spaced at least
//! `60 / requests_per_minute` seconds apart, and each request is retried
//! with exponential backoff until it yields a useful amount of text.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::client::TextGenerator;

/// Tuning for [`RateGate`]
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub requests_per_minute: u32,
    /// Responses shorter than this (after trimming) count as failures
    pub min_useful_length: usize,
    /// Backoff after failed attempt `n` is `base_delay * 2^n`
    pub base_delay: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 10,
            min_useful_length: 50,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl GateConfig {
    /// Minimum spacing between permitted calls
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / f64::from(self.requests_per_minute.max(1)))
    }
}

pub struct RateGate {
    client: Arc<dyn TextGenerator>,
    config: GateConfig,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(client: Arc<dyn TextGenerator>, config: GateConfig) -> Self {
        info!(
            "Text API gate: {} ({} requests/min)",
            client.name(),
            config.requests_per_minute
        );
        Self {
            client,
            config,
            last_call: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Wait for the next permitted slot and keep holding it. Only one
    /// caller owns the slot at a time, from the wait through the request.
    async fn acquire_slot(&self) -> MutexGuard<'_, Option<Instant>> {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let next = previous + self.config.interval();
            if Instant::now() < next {
                debug!(
                    "Throttling text API call for {:?}",
                    next.saturating_duration_since(Instant::now())
                );
                sleep_until(next).await;
            }
        }
        *last_call = Some(Instant::now());
        last_call
    }

    /// Wait until the next call is permitted. The lock is held across the
    /// wait, so waiters are released one at a time.
    pub async fn throttle(&self) {
        let _slot = self.acquire_slot().await;
    }

    /// Generate text for `prompt`, trying up to `max_retries` times.
    ///
    /// Returns `None` when every attempt failed or produced too little
    /// text; errors are logged, never returned.
    pub async fn generate(&self, prompt: &str, max_retries: u32) -> Option<String> {
        for attempt in 0..max_retries {
            // Backoff below runs with the slot released
            let slot = self.acquire_slot().await;
            let result = self.client.generate_text(prompt).await;
            drop(slot);

            match result {
                Ok(text) if text.trim().chars().count() >= self.config.min_useful_length => {
                    debug!("Text API attempt {} succeeded", attempt + 1);
                    return Some(text.trim().to_string());
                }
                Ok(text) => warn!(
                    "Text API attempt {}/{} returned only {} characters",
                    attempt + 1,
                    max_retries,
                    text.trim().chars().count()
                ),
                Err(e) => warn!("Text API attempt {}/{} failed: {}", attempt + 1, max_retries, e),
            }

            if attempt + 1 < max_retries {
                let delay = self.config.base_delay.saturating_mul(2u32.saturating_pow(attempt));
                sleep(delay).await;
            }
        }

        warn!("Text API gave no usable result after {} attempts", max_retries);
        None
    }
}
