//! HTTP/WebSocket implementations of the collaborator interfaces, speaking
//! to a hosted identity service and realtime store.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use reqwest::Client;
use shared::{
    domain::{PostKey, UserHandle, UserId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{AuthResponse, CreatePostRequest, CreatePostResponse, CredentialsRequest, StoreEvent},
};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crate::{IdentityProvider, PostStore};

const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 64;

/// Identity service client. The credential from the last successful
/// authentication is cached in memory only; there is no offline persistence.
pub struct HttpIdentityProvider {
    http: Client,
    server_url: String,
    cached: Mutex<Option<UserHandle>>,
}

impl HttpIdentityProvider {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
            cached: Mutex::new(None),
        }
    }

    async fn authenticate(
        &self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<UserHandle, ApiException> {
        let response = self
            .http
            .post(format!("{}{path}", self.server_url))
            .json(&CredentialsRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(|err| {
                ApiException::new(ErrorCode::Internal, format!("identity request failed: {err}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let exception = match response.json::<ApiError>().await {
                Ok(api_error) => api_error.into(),
                Err(_) => ApiException::new(
                    ErrorCode::Internal,
                    format!("identity service returned {status}"),
                ),
            };
            return Err(exception);
        }

        let body: AuthResponse = response.json().await.map_err(|err| {
            ApiException::new(ErrorCode::Internal, format!("invalid identity response: {err}"))
        })?;

        let handle = UserHandle {
            user_id: body.user_id,
            email: body.email,
        };
        *self.cached.lock().await = Some(handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserHandle, ApiException> {
        self.authenticate("/auth/sign_in", email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserHandle, ApiException> {
        self.authenticate("/auth/sign_up", email, password).await
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(handle) = self.cached.lock().await.take() else {
            return Ok(());
        };
        self.http
            .post(format!("{}/auth/sign_out", self.server_url))
            .query(&[("user_id", handle.user_id.as_str())])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn current_user(&self) -> Option<UserHandle> {
        self.cached.lock().await.clone()
    }
}

/// Store client: post writes over HTTP, the child-added feed over WebSocket.
pub struct HttpPostStore {
    http: Client,
    server_url: String,
}

impl HttpPostStore {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
        }
    }
}

fn websocket_base(server_url: &str) -> Result<String> {
    if server_url.starts_with("https://") {
        Ok(server_url.replacen("https://", "wss://", 1))
    } else if server_url.starts_with("http://") {
        Ok(server_url.replacen("http://", "ws://", 1))
    } else {
        Err(anyhow!("server_url must start with http:// or https://"))
    }
}

#[async_trait]
impl PostStore for HttpPostStore {
    async fn append(&self, user_id: &UserId, value: &str) -> Result<PostKey> {
        let response: CreatePostResponse = self
            .http
            .post(format!("{}/users/{user_id}/posts", self.server_url))
            .json(&CreatePostRequest {
                value: value.to_string(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.key)
    }

    async fn subscribe(
        &self,
        user_id: &UserId,
    ) -> Result<BoxStream<'static, Result<StoreEvent>>> {
        let ws_url = format!(
            "{}/users/{user_id}/posts/watch",
            websocket_base(&self.server_url)?
        );
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .with_context(|| format!("failed to connect store subscription: {ws_url}"))?;
        let (_, mut ws_reader) = ws_stream.split();

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let item = serde_json::from_str::<StoreEvent>(&text)
                            .map_err(|err| anyhow!("invalid store event: {err}"));
                        if tx.send(item).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        let _ = tx
                            .send(Err(anyhow!("store subscription receive failed: {err}")))
                            .await;
                        break;
                    }
                }
            }
            debug!("store subscription socket reader finished");
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
