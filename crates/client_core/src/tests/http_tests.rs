use super::*;
use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tokio::{net::TcpListener, sync::oneshot};

async fn spawn_server(app: Router) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

#[derive(Clone)]
struct CaptureState<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> CaptureState<T> {
    fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    async fn capture(&self, value: T) {
        if let Some(tx) = self.tx.lock().await.take() {
            let _ = tx.send(value);
        }
    }
}

#[tokio::test]
async fn sign_in_parses_auth_response_and_caches_credential() {
    let app = Router::new().route(
        "/auth/sign_in",
        post(|Json(request): Json<CredentialsRequest>| async move {
            Json(AuthResponse {
                user_id: UserId::from("uid-1"),
                email: request.email,
            })
        }),
    );
    let provider = HttpIdentityProvider::new(spawn_server(app).await);

    let handle = provider.sign_in("a@b.com", "pw").await.expect("sign in");

    assert_eq!(handle.user_id, UserId::from("uid-1"));
    assert_eq!(handle.email, "a@b.com");
    let cached = provider.current_user().await.expect("cached credential");
    assert_eq!(cached, handle);
}

#[tokio::test]
async fn sign_in_maps_error_body_to_exception() {
    let app = Router::new().route(
        "/auth/sign_in",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiError::new(ErrorCode::InvalidCredentials, "wrong password")),
            )
        }),
    );
    let provider = HttpIdentityProvider::new(spawn_server(app).await);

    let err = provider
        .sign_in("a@b.com", "bad")
        .await
        .expect_err("must fail");

    assert_eq!(err.code, ErrorCode::InvalidCredentials);
    assert!(err.message.contains("wrong password"));
    assert!(provider.current_user().await.is_none());
}

#[tokio::test]
async fn sign_in_falls_back_on_unparseable_error_body() {
    let app = Router::new().route(
        "/auth/sign_in",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let provider = HttpIdentityProvider::new(spawn_server(app).await);

    let err = provider
        .sign_in("a@b.com", "pw")
        .await
        .expect_err("must fail");

    assert_eq!(err.code, ErrorCode::Internal);
    assert!(err.message.contains("500"));
}

#[tokio::test]
async fn sign_up_uses_account_creation_endpoint() {
    let app = Router::new().route(
        "/auth/sign_up",
        post(|Json(request): Json<CredentialsRequest>| async move {
            Json(AuthResponse {
                user_id: UserId::from("uid-new"),
                email: request.email,
            })
        }),
    );
    let provider = HttpIdentityProvider::new(spawn_server(app).await);

    let handle = provider
        .sign_up("new@example.com", "pw")
        .await
        .expect("sign up");

    assert_eq!(handle.user_id, UserId::from("uid-new"));
}

async fn handle_sign_out(
    State(state): State<CaptureState<String>>,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    state
        .capture(params.get("user_id").cloned().unwrap_or_default())
        .await;
    StatusCode::NO_CONTENT
}

#[tokio::test]
async fn sign_out_notifies_service_and_clears_cached_credential() {
    let (state, captured_rx) = CaptureState::new();
    let app = Router::new()
        .route(
            "/auth/sign_in",
            post(|| async {
                Json(AuthResponse {
                    user_id: UserId::from("uid-1"),
                    email: "a@b.com".to_string(),
                })
            }),
        )
        .route("/auth/sign_out", post(handle_sign_out))
        .with_state(state);
    let provider = HttpIdentityProvider::new(spawn_server(app).await);

    provider.sign_in("a@b.com", "pw").await.expect("sign in");
    provider.sign_out().await.expect("sign out");

    assert_eq!(captured_rx.await.expect("captured"), "uid-1");
    assert!(provider.current_user().await.is_none());
}

#[tokio::test]
async fn sign_out_without_cached_credential_skips_remote_call() {
    // Unroutable url: a request would fail, a no-op must not.
    let provider = HttpIdentityProvider::new("http://127.0.0.1:9");
    provider.sign_out().await.expect("local no-op");
}

async fn handle_create_post(
    Path(user_id): Path<String>,
    State(state): State<CaptureState<(String, CreatePostRequest)>>,
    Json(request): Json<CreatePostRequest>,
) -> impl IntoResponse {
    state.capture((user_id, request)).await;
    Json(CreatePostResponse {
        key: PostKey::from("generated-1"),
    })
}

#[tokio::test]
async fn append_writes_under_user_collection() {
    let (state, captured_rx) = CaptureState::new();
    let app = Router::new()
        .route("/users/:user_id/posts", post(handle_create_post))
        .with_state(state);
    let store = HttpPostStore::new(spawn_server(app).await);

    let key = store
        .append(&UserId::from("uid-7"), "hello")
        .await
        .expect("append");

    assert_eq!(key, PostKey::from("generated-1"));
    let (user_id, request) = captured_rx.await.expect("captured");
    assert_eq!(user_id, "uid-7");
    assert_eq!(request.value, "hello");
}

fn watch_route(frames: Vec<String>) -> Router {
    Router::new().route(
        "/users/:user_id/posts/watch",
        get(move |ws: WebSocketUpgrade| async move {
            ws.on_upgrade(move |mut socket| async move {
                for frame in frames {
                    if socket.send(WsMessage::Text(frame)).await.is_err() {
                        return;
                    }
                }
                let _ = socket.send(WsMessage::Close(None)).await;
            })
        }),
    )
}

fn child_added_frame(key: &str, value: &str) -> String {
    serde_json::to_string(&StoreEvent::ChildAdded {
        key: PostKey::from(key),
        value: value.to_string(),
    })
    .expect("encode store event")
}

#[tokio::test]
async fn subscribe_decodes_child_added_frames() {
    let app = watch_route(vec![
        child_added_frame("k1", "hello"),
        child_added_frame("k2", "world"),
    ]);
    let store = HttpPostStore::new(spawn_server(app).await);

    let mut stream = store
        .subscribe(&UserId::from("uid-1"))
        .await
        .expect("subscribe");

    let StoreEvent::ChildAdded { key, value } =
        stream.next().await.expect("first frame").expect("decode");
    assert_eq!(key, PostKey::from("k1"));
    assert_eq!(value, "hello");

    let StoreEvent::ChildAdded { key, value } =
        stream.next().await.expect("second frame").expect("decode");
    assert_eq!(key, PostKey::from("k2"));
    assert_eq!(value, "world");

    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn subscribe_surfaces_undecodable_frames_and_continues() {
    let app = watch_route(vec![
        "not-json".to_string(),
        child_added_frame("k1", "world"),
    ]);
    let store = HttpPostStore::new(spawn_server(app).await);

    let mut stream = store
        .subscribe(&UserId::from("uid-1"))
        .await
        .expect("subscribe");

    let err = stream
        .next()
        .await
        .expect("first item")
        .expect_err("must be a decode error");
    assert!(err.to_string().contains("invalid store event"));

    let StoreEvent::ChildAdded { value, .. } =
        stream.next().await.expect("second item").expect("decode");
    assert_eq!(value, "world");
}

#[test]
fn websocket_base_rewrites_scheme() {
    assert_eq!(
        websocket_base("http://127.0.0.1:8080").expect("http"),
        "ws://127.0.0.1:8080"
    );
    assert_eq!(
        websocket_base("https://posts.example.com").expect("https"),
        "wss://posts.example.com"
    );
    assert!(websocket_base("ftp://example.com").is_err());
}
