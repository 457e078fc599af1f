//! OAuth token endpoint handling shared by both services

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::IntegrationError;

/// Seconds shaved off a token's lifetime so it is refreshed early
pub const EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// An access token and the instant it stops being usable
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: Option<Instant>,
}

impl CachedToken {
    pub fn from_response(response: &TokenResponse) -> Self {
        let expires_at = response.expires_in.map(|secs| {
            Instant::now() + Duration::from_secs(secs.saturating_sub(EXPIRY_MARGIN_SECS))
        });
        Self {
            access_token: response.access_token.clone(),
            expires_at,
        }
    }

    /// A token with no known expiry (static token from the environment)
    pub fn unbounded(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at.map(|t| Instant::now() < t).unwrap_or(true)
    }
}

/// POST a form to a token endpoint
pub async fn request_token(
    http: &Client,
    service: &'static str,
    url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, IntegrationError> {
    let response = http.post(url).form(form).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IntegrationError::Auth(format!(
            "{} token endpoint returned HTTP {}: {}",
            service,
            status.as_u16(),
            body.chars().take(300).collect::<String>()
        )));
    }
    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))?;
    debug!(
        "{} issued a token (expires in {:?}s, refresh token: {})",
        service,
        token.expires_in,
        token.refresh_token.is_some()
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_margin_applied() {
        let token = CachedToken::from_response(&TokenResponse {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_in: Some(30),
        });
        // 30s lifetime minus a 60s margin is already expired
        assert!(!token.is_valid());

        let token = CachedToken::from_response(&TokenResponse {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_in: Some(14_400),
        });
        assert!(token.is_valid());
        assert!(CachedToken::unbounded("static").is_valid());
    }
}
