use serde::{Deserialize, Serialize};

use crate::domain::{PostKey, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostResponse {
    pub key: PostKey,
}

/// Change notifications delivered over a store subscription.
///
/// The store replays one `ChildAdded` per pre-existing child when the
/// subscription opens, then one per subsequently added child.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StoreEvent {
    ChildAdded { key: PostKey, value: String },
}
