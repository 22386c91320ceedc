use axum::Json;
use serde::{Deserialize, Serialize};

/// Authenticated actor summary injected by the upstream gateway via the
/// `X-User` header. Never contains credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Principal {
    pub(crate) id: i64,
    #[serde(rename = "userName")]
    pub(crate) user_name: String,
    #[serde(rename = "firstName", default)]
    pub(crate) first_name: String,
    #[serde(rename = "lastName", default)]
    pub(crate) last_name: String,
    #[serde(rename = "photoURL", default)]
    pub(crate) photo_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateChannelRequest {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) private: bool,
    #[serde(default)]
    pub(crate) members: Vec<Principal>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UpdateChannelRequest {
    pub(crate) name: Option<String>,
    pub(crate) description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PostMessageRequest {
    pub(crate) body: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct EditMessageRequest {
    pub(crate) body: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RemoveMemberRequest {
    pub(crate) id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    pub(crate) before: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChannelResponse {
    #[serde(rename = "channelID")]
    pub(crate) channel_id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) private: bool,
    pub(crate) members: Vec<Principal>,
    pub(crate) creator: Principal,
    #[serde(rename = "createdAt")]
    pub(crate) created_at_unix: i64,
    #[serde(rename = "editedAt")]
    pub(crate) edited_at_unix: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MessageResponse {
    #[serde(rename = "messageID")]
    pub(crate) message_id: String,
    #[serde(rename = "channelID")]
    pub(crate) channel_id: String,
    pub(crate) body: String,
    pub(crate) creator: Principal,
    #[serde(rename = "createdAt")]
    pub(crate) created_at_unix: i64,
    #[serde(rename = "editedAt")]
    pub(crate) edited_at_unix: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    pub(crate) status: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiError {
    pub(crate) error: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
