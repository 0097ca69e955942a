use std::sync::{Arc, Weak};

use anyhow::Result;
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use shared::{
    domain::{PostKey, UserHandle, UserId},
    error::ApiException,
    protocol::StoreEvent,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod error;
pub mod http;

pub use error::SessionError;
pub use http::{HttpIdentityProvider, HttpPostStore};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// External identity service: sign-in, account creation, sign-out, and the
/// credential cached from a previous authentication, if any.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserHandle, ApiException>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<UserHandle, ApiException>;
    async fn sign_out(&self) -> Result<()>;
    async fn current_user(&self) -> Option<UserHandle>;
}

/// External hierarchical store holding each user's posts under
/// `users/{user_id}`. Keys are assigned by the store on write.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn append(&self, user_id: &UserId, value: &str) -> Result<PostKey>;
    async fn subscribe(
        &self,
        user_id: &UserId,
    ) -> Result<BoxStream<'static, Result<StoreEvent>>>;
}

/// State transitions broadcast to the presentation layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SignedIn { user_id: UserId },
    SignedOut,
    PostAdded { value: String },
    Error(String),
}

struct PostWatch {
    task: JoinHandle<()>,
}

impl Drop for PostWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Default)]
struct SessionState {
    user_id: Option<UserId>,
    signed_in: bool,
    posts: Vec<String>,
    watch: Option<PostWatch>,
}

/// Owns sign-in state, the current user identity, and the locally observed
/// post cache. All remote work is delegated to the two collaborator traits;
/// the cache is only ever filled through the store subscription echo.
pub struct SessionController {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn PostStore>,
    inner: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn PostStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            identity,
            store,
            inner: Arc::new(Mutex::new(SessionState::default())),
            events,
        })
    }

    /// Startup hook: adopts the provider's cached credential, if one exists.
    /// This is the single point where ambient provider state is consulted;
    /// afterwards the session state is the only source of truth.
    pub async fn resume_cached_session(&self) -> bool {
        match self.identity.current_user().await {
            Some(handle) => {
                self.begin_session(handle).await;
                true
            }
            None => false,
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserId, SessionError> {
        let handle = self.identity.sign_in(email, password).await?;
        Ok(self.begin_session(handle).await)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<UserId, SessionError> {
        let handle = self.identity.sign_up(email, password).await?;
        Ok(self.begin_session(handle).await)
    }

    /// Remote sign-out is best effort; local teardown happens regardless of
    /// its outcome. Clears the post cache and cancels the post subscription.
    pub async fn sign_out(&self) {
        if let Err(err) = self.identity.sign_out().await {
            warn!("session: remote sign-out failed, tearing down locally anyway: {err}");
        }

        let watch = {
            let mut inner = self.inner.lock().await;
            inner.user_id = None;
            inner.signed_in = false;
            inner.posts.clear();
            inner.watch.take()
        };
        drop(watch);

        info!("session: signed out");
        let _ = self.events.send(SessionEvent::SignedOut);
    }

    /// Appends `text` under the current user's collection. The local cache is
    /// not touched here; the value arrives through the subscription echo.
    pub async fn create_post(&self, text: &str) -> Result<PostKey, SessionError> {
        if text.is_empty() {
            return Err(SessionError::EmptyPost);
        }
        let user_id = self.session_user().await?;
        let key = self
            .store
            .append(&user_id, text)
            .await
            .map_err(|err| SessionError::Store(err.to_string()))?;
        info!(user_id = %user_id, key = %key, "session: post stored");
        Ok(key)
    }

    /// Opens the standing child-added subscription for the current user and
    /// spawns the reader that folds events into the post cache. Calling this
    /// again replaces (and aborts) a previously running subscription.
    pub async fn watch_posts(&self) -> Result<(), SessionError> {
        let user_id = self.session_user().await?;
        let stream = self
            .store
            .subscribe(&user_id)
            .await
            .map_err(|err| SessionError::Subscribe(err.to_string()))?;

        let task = spawn_post_reader(
            user_id,
            Arc::downgrade(&self.inner),
            self.events.clone(),
            stream,
        );
        let previous = {
            let mut inner = self.inner.lock().await;
            inner.watch.replace(PostWatch { task })
        };
        drop(previous);
        Ok(())
    }

    pub async fn is_signed_in(&self) -> bool {
        self.inner.lock().await.signed_in
    }

    pub async fn current_user_id(&self) -> Option<UserId> {
        self.inner.lock().await.user_id.clone()
    }

    pub async fn posts(&self) -> Vec<String> {
        self.inner.lock().await.posts.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn begin_session(&self, handle: UserHandle) -> UserId {
        let user_id = handle.user_id;
        {
            let mut inner = self.inner.lock().await;
            inner.user_id = Some(user_id.clone());
            inner.signed_in = true;
        }
        info!(user_id = %user_id, "session: signed in");
        let _ = self.events.send(SessionEvent::SignedIn {
            user_id: user_id.clone(),
        });
        user_id
    }

    async fn session_user(&self) -> Result<UserId, SessionError> {
        self.inner
            .lock()
            .await
            .user_id
            .clone()
            .ok_or(SessionError::NotSignedIn)
    }
}

fn spawn_post_reader(
    user_id: UserId,
    inner: Weak<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
    mut stream: BoxStream<'static, Result<StoreEvent>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = stream.next().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            match item {
                Ok(StoreEvent::ChildAdded { key, value }) => {
                    let appended = {
                        let mut inner = inner.lock().await;
                        if inner.posts.contains(&value) {
                            false
                        } else {
                            inner.posts.push(value.clone());
                            true
                        }
                    };
                    if appended {
                        let _ = events.send(SessionEvent::PostAdded { value });
                    } else {
                        debug!(key = %key, "session: duplicate post value suppressed");
                    }
                }
                Err(err) => {
                    let _ = events.send(SessionEvent::Error(format!("post subscription: {err}")));
                }
            }
        }
        info!(user_id = %user_id, "session: post subscription closed");
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
