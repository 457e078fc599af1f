//! Local redirect listener for the authorization-code flow

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use reqwest::Url;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::errors::IntegrationError;

pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<Result<String, IntegrationError>>>>>;

#[derive(Clone)]
struct CallbackState {
    sender: CallbackSender,
    /// `state` sent in the authorize URL; the redirect must echo it
    expected_state: Arc<str>,
}

/// Bind the host and port of `redirect_uri` and wait for the provider to
/// redirect back with `?code=` and the same `state` that was sent
pub async fn wait_for_callback(
    redirect_uri: &str,
    expected_state: &str,
    wait: Duration,
) -> Result<String, IntegrationError> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| IntegrationError::InvalidResponse(format!("bad redirect URI: {}", e)))?;
    let host = url.host_str().unwrap_or("localhost").to_string();
    let port = url.port_or_known_default().unwrap_or(80);
    let path = url.path().to_string();

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!("Waiting for OAuth callback on {}", redirect_uri);
    run_callback_listener(listener, &path, expected_state, wait).await
}

/// Serve `path` on `listener` until one callback arrives or `wait` passes
pub async fn run_callback_listener(
    listener: TcpListener,
    path: &str,
    expected_state: &str,
    wait: Duration,
) -> Result<String, IntegrationError> {
    let (result_tx, result_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let callback_state = CallbackState {
        sender: Arc::new(Mutex::new(Some(result_tx))),
        expected_state: Arc::from(expected_state),
    };

    let app = Router::new()
        .route(path, get(callback))
        .with_state(callback_state);

    let server = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            warn!("OAuth callback listener failed: {}", e);
        }
    });

    let outcome = tokio::time::timeout(wait, result_rx).await;
    let _ = shutdown_tx.send(());
    let _ = server.await;

    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(IntegrationError::Auth("callback listener closed".to_string())),
        Err(_) => Err(IntegrationError::CallbackTimeout),
    }
}

async fn callback(
    State(callback_state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let state_matches = params.state.as_deref() == Some(&*callback_state.expected_state);
    let (result, page) = match (params.code, params.error) {
        (Some(code), None) if !code.is_empty() && !state_matches => {
            warn!("OAuth callback state did not match the authorization request");
            (
                Err(IntegrationError::Auth("state mismatch in callback".to_string())),
                "<h1>Authorization failed</h1><p>The response did not match this request.</p>",
            )
        }
        (Some(code), _) if !code.is_empty() => (
            Ok(code),
            "<h1>Authorization successful</h1><p>You can close this window.</p>",
        ),
        (_, Some(error)) => (
            Err(IntegrationError::Auth(error)),
            "<h1>Authorization failed</h1><p>Return to the terminal for details.</p>",
        ),
        _ => (
            Err(IntegrationError::Auth("callback carried no code".to_string())),
            "<h1>Authorization failed</h1><p>No authorization code was received.</p>",
        ),
    };

    let tx = callback_state
        .sender
        .lock()
        .ok()
        .and_then(|mut slot| slot.take());
    if let Some(tx) = tx {
        let _ = tx.send(result);
    }
    Html(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_callback_delivers_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiting = tokio::spawn(run_callback_listener(
            listener,
            "/callback",
            "s",
            Duration::from_secs(5),
        ));

        let body = reqwest::get(format!("http://{}/callback?code=abc123&state=s", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("successful"));

        let code = waiting.await.unwrap().unwrap();
        assert_eq!(code, "abc123");
    }

    #[tokio::test]
    async fn test_callback_with_wrong_state_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiting = tokio::spawn(run_callback_listener(
            listener,
            "/callback",
            "expected-state",
            Duration::from_secs(5),
        ));

        let body = reqwest::get(format!("http://{}/callback?code=abc123&state=forged", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("failed"));

        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, IntegrationError::Auth(ref e) if e.contains("state")));
    }

    #[tokio::test]
    async fn test_callback_without_state_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiting = tokio::spawn(run_callback_listener(
            listener,
            "/callback",
            "expected-state",
            Duration::from_secs(5),
        ));

        reqwest::get(format!("http://{}/callback?code=abc123", addr))
            .await
            .unwrap();

        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, IntegrationError::Auth(_)));
    }

    #[tokio::test]
    async fn test_callback_error_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiting = tokio::spawn(run_callback_listener(
            listener,
            "/callback",
            "s",
            Duration::from_secs(5),
        ));

        reqwest::get(format!("http://{}/callback?error=access_denied", addr))
            .await
            .unwrap();

        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, IntegrationError::Auth(ref e) if e == "access_denied"));
    }

    #[tokio::test]
    async fn test_listener_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let err = run_callback_listener(listener, "/callback", "s", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::CallbackTimeout));
    }
}
