//! Mural public API client

use std::time::Duration;

use reqwest::{Client, Url};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::errors::IntegrationError;
use crate::token::{request_token, TokenResponse};

pub const MURAL_API_BASE: &str = "https://app.mural.co/api/public/v1";
pub const MURAL_SCOPES: &str = "rooms:read workspaces:read murals:read identity:read";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5000/callback";

/// Safety cap on widget pages
const MAX_PAGES: usize = 500;

const SERVICE: &str = "Mural";

#[derive(Debug, Clone)]
pub struct MuralConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub mural_id: Option<String>,
    pub mural_title: String,
    pub api_base: String,
}

impl Default for MuralConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            access_token: None,
            refresh_token: None,
            mural_id: None,
            mural_title: "Mural".to_string(),
            api_base: MURAL_API_BASE.to_string(),
        }
    }
}

impl MuralConfig {
    pub fn has_client_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub fn can_fetch(&self) -> bool {
        self.mural_id.as_deref().is_some_and(|id| !id.is_empty())
            && (self.access_token.as_deref().is_some_and(|t| !t.is_empty())
                || (self.has_client_credentials() && self.refresh_token.is_some()))
    }

    fn token_url(&self) -> String {
        format!("{}/authorization/oauth2/token", self.api_base.trim_end_matches('/'))
    }
}

pub struct MuralClient {
    http: Client,
    config: MuralConfig,
    access_token: RwLock<Option<String>>,
}

impl MuralClient {
    pub fn new(config: MuralConfig) -> Result<Self, IntegrationError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let access_token = config.access_token.clone().filter(|t| !t.is_empty());
        Ok(Self {
            http,
            config,
            access_token: RwLock::new(access_token),
        })
    }

    pub fn config(&self) -> &MuralConfig {
        &self.config
    }

    /// Access token currently in use, including one obtained by a refresh
    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    /// Browser URL for the authorization-code flow
    pub fn authorize_url(&self, state: &str) -> Result<Url, IntegrationError> {
        let base = format!("{}/authorization/oauth2/", self.config.api_base.trim_end_matches('/'));
        Url::parse_with_params(
            &base,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", MURAL_SCOPES),
                ("state", state),
                ("response_type", "code"),
            ],
        )
        .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))
    }

    /// Exchange an authorization code; the new access token is kept
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, IntegrationError> {
        if !self.config.has_client_credentials() {
            return Err(IntegrationError::NotConfigured("Mural client credentials"));
        }
        let token = request_token(
            &self.http,
            SERVICE,
            &self.config.token_url(),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ],
        )
        .await?;
        *self.access_token.write().await = Some(token.access_token.clone());
        Ok(token)
    }

    /// Use the refresh token for a new access token
    pub async fn refresh(&self) -> Result<TokenResponse, IntegrationError> {
        let refresh_token = self
            .config
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(IntegrationError::NotConfigured("Mural refresh token"))?;
        if !self.config.has_client_credentials() {
            return Err(IntegrationError::NotConfigured("Mural client credentials"));
        }
        let token = request_token(
            &self.http,
            SERVICE,
            &self.config.token_url(),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
        )
        .await?;
        *self.access_token.write().await = Some(token.access_token.clone());
        info!("Refreshed Mural access token");
        Ok(token)
    }

    async fn current_token(&self) -> Result<String, IntegrationError> {
        if let Some(token) = self.access_token.read().await.clone() {
            return Ok(token);
        }
        Ok(self.refresh().await?.access_token)
    }

    /// Every widget on a board, following `next` tokens.
    ///
    /// A failure on the first page is an error (a 401 triggers one token
    /// refresh). A failure on a later page ends pagination and the widgets
    /// fetched so far are returned.
    pub async fn fetch_widgets(&self, mural_id: &str) -> Result<Vec<Value>, IntegrationError> {
        let first = match self.fetch_page(mural_id, None).await {
            Err(e) if e.is_unauthorized() && self.config.refresh_token.is_some() => {
                warn!("Mural rejected the access token; refreshing");
                self.refresh().await?;
                self.fetch_page(mural_id, None).await?
            }
            other => other?,
        };

        let (mut widgets, mut next) = first;
        let mut pages = 1;

        while let Some(token) = next.take() {
            if pages >= MAX_PAGES {
                warn!("Stopping widget pagination after {} pages", pages);
                break;
            }
            match self.fetch_page(mural_id, Some(&token)).await {
                Ok((page, following)) => {
                    pages += 1;
                    debug!("Page {}: {} widgets", pages, page.len());
                    widgets.extend(page);
                    next = following;
                }
                Err(e) => {
                    warn!(
                        "Widget page {} failed, keeping {} widgets: {}",
                        pages + 1,
                        widgets.len(),
                        e
                    );
                    break;
                }
            }
        }

        info!("Fetched {} widgets in {} pages", widgets.len(), pages);
        Ok(widgets)
    }

    /// The user behind the current token (`GET /identity`), refreshing once
    /// on a 401
    pub async fn identity(&self) -> Result<Value, IntegrationError> {
        let url = format!("{}/identity", self.config.api_base.trim_end_matches('/'));
        match self.get_json(&url, &[]).await {
            Err(e) if e.is_unauthorized() && self.config.refresh_token.is_some() => {
                warn!("Mural rejected the access token; refreshing");
                self.refresh().await?;
                self.get_json(&url, &[]).await
            }
            other => other,
        }
    }

    async fn fetch_page(
        &self,
        mural_id: &str,
        next: Option<&str>,
    ) -> Result<(Vec<Value>, Option<String>), IntegrationError> {
        let url = format!(
            "{}/murals/{}/widgets",
            self.config.api_base.trim_end_matches('/'),
            mural_id
        );
        let query: Vec<(&str, &str)> = next.map(|n| ("next", n)).into_iter().collect();
        let body = self.get_json(&url, &query).await?;
        parse_widget_page(body)
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, IntegrationError> {
        let token = self.current_token().await?;
        let mut request = self
            .http
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json");
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))
    }
}

/// Accepts `{value: [...], next}` or a bare array
pub fn parse_widget_page(body: Value) -> Result<(Vec<Value>, Option<String>), IntegrationError> {
    match body {
        Value::Array(widgets) => Ok((widgets, None)),
        Value::Object(mut map) => {
            let widgets = match map.remove("value") {
                Some(Value::Array(widgets)) => widgets,
                _ => {
                    return Err(IntegrationError::InvalidResponse(
                        "widget page has no 'value' array".to_string(),
                    ))
                }
            };
            let next = map
                .remove("next")
                .and_then(|n| n.as_str().map(str::to_string))
                .filter(|n| !n.is_empty());
            Ok((widgets, next))
        }
        _ => Err(IntegrationError::InvalidResponse(
            "unexpected widget page shape".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_parse_widget_page_shapes() {
        let (widgets, next) =
            parse_widget_page(json!({"value": [{"id": "a"}], "next": "tok"})).unwrap();
        assert_eq!(widgets.len(), 1);
        assert_eq!(next.as_deref(), Some("tok"));

        let (_, next) = parse_widget_page(json!({"value": [], "next": ""})).unwrap();
        assert_eq!(next, None);

        let (widgets, next) = parse_widget_page(json!([{"id": "a"}, {"id": "b"}])).unwrap();
        assert_eq!(widgets.len(), 2);
        assert_eq!(next, None);

        assert!(parse_widget_page(json!("nope")).is_err());
    }

    #[test]
    fn test_authorize_url() {
        let client = MuralClient::new(MuralConfig {
            client_id: "cid".to_string(),
            ..MuralConfig::default()
        })
        .unwrap();
        let url = client.authorize_url("xyz").unwrap();
        assert!(url.as_str().starts_with("https://app.mural.co/api/public/v1/authorization/oauth2/?"));
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["scope"], MURAL_SCOPES);
        assert_eq!(pairs["redirect_uri"], DEFAULT_REDIRECT_URI);
        assert_eq!(pairs["state"], "xyz");
    }

    #[derive(Clone, Default)]
    struct MockMural {
        refreshes: Arc<AtomicUsize>,
        fail_page: Option<String>,
    }

    async fn widgets(
        State(mock): State<MockMural>,
        Path(_id): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> Response {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth == "Bearer expired" {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let next = query.get("next").cloned();
        if next.is_some() && next == mock.fail_page {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        match next.as_deref() {
            None => Json(json!({"value": [{"id": "1"}, {"id": "2"}], "next": "p2"})),
            Some("p2") => Json(json!({"value": [{"id": "3"}], "next": "p3"})),
            _ => Json(json!({"value": [{"id": "4"}]})),
        }
        .into_response()
    }

    async fn identity(headers: HeaderMap) -> Response {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer expired") | None => StatusCode::UNAUTHORIZED.into_response(),
            Some(_) => Json(json!({"value": {"id": "u1", "firstName": "Ada", "email": "ada@example.com"}}))
                .into_response(),
        }
    }

    async fn token(State(mock): State<MockMural>) -> Json<Value> {
        mock.refreshes.fetch_add(1, Ordering::SeqCst);
        Json(json!({"access_token": "fresh", "refresh_token": "r2", "expires_in": 900}))
    }

    async fn serve(mock: MockMural) -> String {
        let app = Router::new()
            .route("/murals/:id/widgets", get(widgets))
            .route("/identity", get(identity))
            .route("/authorization/oauth2/token", post(token))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(api_base: String, access_token: &str) -> MuralConfig {
        MuralConfig {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            access_token: Some(access_token.to_string()),
            refresh_token: Some("r1".to_string()),
            mural_id: Some("board.1".to_string()),
            api_base,
            ..MuralConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_follows_pagination_until_next_absent() {
        let base = serve(MockMural::default()).await;
        let client = MuralClient::new(config(base, "good")).unwrap();

        let widgets = client.fetch_widgets("board.1").await.unwrap();
        let ids: Vec<&str> = widgets.iter().filter_map(|w| w["id"].as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_later_page_error_keeps_fetched_widgets() {
        let mock = MockMural {
            fail_page: Some("p3".to_string()),
            ..MockMural::default()
        };
        let base = serve(mock).await;
        let client = MuralClient::new(config(base, "good")).unwrap();

        let widgets = client.fetch_widgets("board.1").await.unwrap();
        assert_eq!(widgets.len(), 3);
    }

    #[tokio::test]
    async fn test_identity_with_valid_token() {
        let mock = MockMural::default();
        let base = serve(mock.clone()).await;
        let client = MuralClient::new(config(base, "good")).unwrap();

        let user = client.identity().await.unwrap();
        assert_eq!(user["value"]["email"], "ada@example.com");
        assert_eq!(mock.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_identity_refreshes_expired_token() {
        let mock = MockMural::default();
        let base = serve(mock.clone()).await;
        let client = MuralClient::new(config(base, "expired")).unwrap();

        let user = client.identity().await.unwrap();
        assert_eq!(user["value"]["id"], "u1");
        assert_eq!(mock.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(client.access_token().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_identity_without_refresh_token_fails() {
        let base = serve(MockMural::default()).await;
        let client = MuralClient::new(MuralConfig {
            refresh_token: None,
            ..config(base, "expired")
        })
        .unwrap();

        let err = client.identity().await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_unauthorized_first_page_refreshes() {
        let mock = MockMural::default();
        let base = serve(mock.clone()).await;
        let client = MuralClient::new(config(base, "expired")).unwrap();

        let widgets = client.fetch_widgets("board.1").await.unwrap();
        assert_eq!(widgets.len(), 4);
        assert_eq!(mock.refreshes.load(Ordering::SeqCst), 1);
    }
}
