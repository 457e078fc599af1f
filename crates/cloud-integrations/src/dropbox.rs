//! Dropbox upload client
//!
//! Uses the refresh-token flow when a refresh token is configured and a
//! static access token otherwise. Files up to [`SIMPLE_UPLOAD_LIMIT`] go
//! through the single-request upload endpoint; larger files use an upload
//! session in fixed-size chunks.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::IntegrationError;
use crate::token::{request_token, CachedToken, TokenResponse};

pub const SIMPLE_UPLOAD_LIMIT: usize = 150 * 1024 * 1024;
pub const SESSION_CHUNK_SIZE: usize = 8 * 1024 * 1024;

const SERVICE: &str = "Dropbox";

/// Base URLs; overridable so tests can point at a local server
#[derive(Debug, Clone)]
pub struct DropboxEndpoints {
    pub token_url: String,
    pub api_url: String,
    pub content_url: String,
    pub authorize_url: String,
}

impl Default for DropboxEndpoints {
    fn default() -> Self {
        Self {
            token_url: "https://api.dropbox.com/oauth2/token".to_string(),
            api_url: "https://api.dropboxapi.com".to_string(),
            content_url: "https://content.dropboxapi.com".to_string(),
            authorize_url: "https://www.dropbox.com/oauth2/authorize".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DropboxConfig {
    pub app_key: String,
    pub app_secret: String,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    /// Remote folder uploads land in, e.g. `/Reports`
    pub folder: String,
}

impl DropboxConfig {
    /// Usable when a refresh token (with app credentials) or a static
    /// access token is present
    pub fn is_configured(&self) -> bool {
        let can_refresh = self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
            && !self.app_key.is_empty()
            && !self.app_secret.is_empty();
        can_refresh || self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Metadata Dropbox returns for a stored file
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Account behind the current token
#[derive(Debug, Clone, Deserialize)]
pub struct DropboxAccount {
    pub account_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<AccountName>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountName {
    pub display_name: String,
}

impl DropboxAccount {
    pub fn display_name(&self) -> &str {
        self.name
            .as_ref()
            .map(|n| n.display_name.as_str())
            .unwrap_or("")
    }
}

#[derive(Deserialize)]
struct SessionStart {
    session_id: String,
}

pub struct DropboxClient {
    http: Client,
    config: DropboxConfig,
    endpoints: DropboxEndpoints,
    token: Mutex<Option<CachedToken>>,
    simple_limit: usize,
    chunk_size: usize,
}

impl DropboxClient {
    pub fn new(config: DropboxConfig) -> Result<Self, IntegrationError> {
        Self::with_endpoints(config, DropboxEndpoints::default())
    }

    pub fn with_endpoints(
        config: DropboxConfig,
        endpoints: DropboxEndpoints,
    ) -> Result<Self, IntegrationError> {
        if !config.is_configured() {
            return Err(IntegrationError::NotConfigured(SERVICE));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            config,
            endpoints,
            token: Mutex::new(None),
            simple_limit: SIMPLE_UPLOAD_LIMIT,
            chunk_size: SESSION_CHUNK_SIZE,
        })
    }

    /// Override the simple-upload limit and session chunk size
    pub fn with_chunking(mut self, simple_limit: usize, chunk_size: usize) -> Self {
        self.simple_limit = simple_limit;
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Full remote path for a file name inside the configured folder
    pub fn remote_path(&self, file_name: &str) -> String {
        let folder = self.config.folder.trim_matches('/');
        if folder.is_empty() {
            format!("/{}", file_name)
        } else {
            format!("/{}/{}", folder, file_name)
        }
    }

    /// Current access token, refreshing when expired or when `force` is set
    pub async fn access_token(&self, force: bool) -> Result<String, IntegrationError> {
        let mut cached = self.token.lock().await;
        if !force {
            if let Some(token) = cached.as_ref().filter(|t| t.is_valid()) {
                return Ok(token.access_token.clone());
            }
        }

        let token = match self.config.refresh_token.as_deref().filter(|t| !t.is_empty()) {
            Some(refresh_token) => {
                debug!("Refreshing Dropbox access token");
                let response = request_token(
                    &self.http,
                    SERVICE,
                    &self.endpoints.token_url,
                    &[
                        ("grant_type", "refresh_token"),
                        ("refresh_token", refresh_token),
                        ("client_id", self.config.app_key.as_str()),
                        ("client_secret", self.config.app_secret.as_str()),
                    ],
                )
                .await?;
                CachedToken::from_response(&response)
            }
            None => match (&*cached, self.config.access_token.as_deref()) {
                (Some(_), _) if force => {
                    return Err(IntegrationError::Auth(
                        "static Dropbox token was rejected and no refresh token is configured"
                            .to_string(),
                    ))
                }
                (_, Some(static_token)) => CachedToken::unbounded(static_token),
                (_, None) => return Err(IntegrationError::NotConfigured(SERVICE)),
            },
        };

        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Fetch a fresh token and look up the account it belongs to
    pub async fn check_connection(&self) -> Result<DropboxAccount, IntegrationError> {
        let token = self.access_token(true).await?;
        let url = format!(
            "{}/2/users/get_current_account",
            self.endpoints.api_url.trim_end_matches('/')
        );
        let response = self.http.post(url).bearer_auth(&token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        let account: DropboxAccount = parse_json(response).await?;
        info!("Dropbox connection ok for account {}", account.account_id);
        Ok(account)
    }

    /// Upload a local file into the configured folder
    pub async fn upload_file(
        &self,
        local_path: &Path,
        remote_name: &str,
    ) -> Result<UploadedFile, IntegrationError> {
        let data = tokio::fs::read(local_path).await?;
        let remote_path = self.remote_path(remote_name);
        info!(
            "Uploading {} ({} bytes) to Dropbox {}",
            local_path.display(),
            data.len(),
            remote_path
        );
        self.upload_bytes(&remote_path, &data).await
    }

    /// Upload bytes to `remote_path`, refreshing the token once on 401
    pub async fn upload_bytes(
        &self,
        remote_path: &str,
        data: &[u8],
    ) -> Result<UploadedFile, IntegrationError> {
        match self.try_upload(remote_path, data, false).await {
            Err(e) if e.is_unauthorized() => {
                warn!("Dropbox rejected the access token; refreshing and retrying once");
                self.try_upload(remote_path, data, true).await
            }
            other => other,
        }
    }

    async fn try_upload(
        &self,
        remote_path: &str,
        data: &[u8],
        force_refresh: bool,
    ) -> Result<UploadedFile, IntegrationError> {
        let token = self.access_token(force_refresh).await?;
        let uploaded = if data.len() <= self.simple_limit {
            self.simple_upload(&token, remote_path, data).await?
        } else {
            self.session_upload(&token, remote_path, data).await?
        };
        info!(
            "Uploaded {} ({} bytes)",
            uploaded.path_display.as_deref().unwrap_or(&uploaded.name),
            uploaded.size
        );
        Ok(uploaded)
    }

    async fn simple_upload(
        &self,
        token: &str,
        remote_path: &str,
        data: &[u8],
    ) -> Result<UploadedFile, IntegrationError> {
        let arg = json!({ "path": remote_path, "mode": "overwrite" });
        let response = self.content_call(token, "files/upload", &arg, data).await?;
        parse_json(response).await
    }

    async fn session_upload(
        &self,
        token: &str,
        remote_path: &str,
        data: &[u8],
    ) -> Result<UploadedFile, IntegrationError> {
        let chunks: Vec<&[u8]> = data.chunks(self.chunk_size).collect();
        debug!("Dropbox upload session with {} chunks", chunks.len());

        let (first, rest) = chunks
            .split_first()
            .map(|(first, rest)| (*first, rest))
            .unwrap_or((&[][..], &[][..]));

        let response = self
            .content_call(token, "files/upload_session/start", &json!({ "close": false }), first)
            .await?;
        let session: SessionStart = parse_json(response).await?;

        let mut offset = first.len();
        let (last, middle) = match rest.split_last() {
            Some((last, middle)) => (*last, middle),
            None => (&[][..], &[][..]),
        };

        for chunk in middle {
            let arg = json!({
                "cursor": { "session_id": session.session_id, "offset": offset },
                "close": false,
            });
            self.content_call(token, "files/upload_session/append_v2", &arg, chunk)
                .await?;
            offset += chunk.len();
        }

        let arg = json!({
            "cursor": { "session_id": session.session_id, "offset": offset },
            "commit": { "path": remote_path, "mode": "overwrite" },
        });
        let response = self
            .content_call(token, "files/upload_session/finish", &arg, last)
            .await?;
        parse_json(response).await
    }

    async fn content_call(
        &self,
        token: &str,
        route: &str,
        arg: &serde_json::Value,
        body: &[u8],
    ) -> Result<reqwest::Response, IntegrationError> {
        let url = format!("{}/2/{}", self.endpoints.content_url.trim_end_matches('/'), route);
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .header("Dropbox-API-Arg", arg.to_string())
            .header("Content-Type", "application/octet-stream")
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(IntegrationError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            })
        }
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, IntegrationError> {
    response
        .json()
        .await
        .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))
}

/// URL the user opens to grant offline access
pub fn authorize_url(app_key: &str) -> Result<Url, IntegrationError> {
    authorize_url_with(&DropboxEndpoints::default(), app_key)
}

fn authorize_url_with(endpoints: &DropboxEndpoints, app_key: &str) -> Result<Url, IntegrationError> {
    Url::parse_with_params(
        &endpoints.authorize_url,
        &[
            ("client_id", app_key),
            ("response_type", "code"),
            ("token_access_type", "offline"),
        ],
    )
    .map_err(|e| IntegrationError::InvalidResponse(e.to_string()))
}

/// Exchange an authorization code for access and refresh tokens
pub async fn exchange_code(
    app_key: &str,
    app_secret: &str,
    code: &str,
) -> Result<TokenResponse, IntegrationError> {
    let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
    let endpoints = DropboxEndpoints::default();
    request_token(
        &http,
        SERVICE,
        &endpoints.token_url,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.trim()),
            ("client_id", app_key),
            ("client_secret", app_secret),
        ],
    )
    .await
}
