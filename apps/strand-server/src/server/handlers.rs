//! HTTP handlers. Each one extracts the caller, delegates to a
//! service, and shapes the response; nothing else lives here.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};

use super::{
    channels,
    core::AppState,
    errors::ApiFailure,
    messages,
    types::{
        ChannelResponse, CreateChannelRequest, EditMessageRequest, HistoryQuery, MessageResponse,
        PostMessageRequest, Principal, RemoveMemberRequest, StatusResponse, UpdateChannelRequest,
    },
};

/// The upstream gateway authenticates the caller and forwards the
/// identity as JSON in `X-User`. A missing or malformed header means
/// the request never went through the gateway.
pub(crate) fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, ApiFailure> {
    let raw = headers
        .get("x-user")
        .ok_or(ApiFailure::Unauthenticated)?
        .to_str()
        .map_err(|_| ApiFailure::Unauthenticated)?;
    serde_json::from_str(raw).map_err(|_| ApiFailure::Unauthenticated)
}

// Extracting from request parts keeps the identity check ahead of body
// deserialization, so an anonymous caller gets 401 even with a
// malformed body.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiFailure;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers)
    }
}

pub(crate) async fn list_channels(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<ChannelResponse>>, ApiFailure> {
    let listed = channels::list_channels_internal(&state, &principal).await?;
    Ok(Json(listed.iter().map(|channel| channel.response()).collect()))
}

pub(crate) async fn create_channel(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<ChannelResponse>), ApiFailure> {
    let channel = channels::create_channel_internal(&state, &principal, request).await?;
    Ok((StatusCode::CREATED, Json(channel.response())))
}

pub(crate) async fn get_channel_messages(
    State(state): State<AppState>,
    principal: Principal,
    Path(channel_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiFailure> {
    let page =
        channels::list_channel_messages_internal(&state, &principal, &channel_id, query.before)
            .await?;
    Ok(Json(page.iter().map(|message| message.response()).collect()))
}

pub(crate) async fn update_channel(
    State(state): State<AppState>,
    principal: Principal,
    Path(channel_id): Path<String>,
    Json(request): Json<UpdateChannelRequest>,
) -> Result<Json<ChannelResponse>, ApiFailure> {
    let channel =
        channels::update_channel_internal(&state, &principal, &channel_id, request).await?;
    Ok(Json(channel.response()))
}

pub(crate) async fn delete_channel(
    State(state): State<AppState>,
    principal: Principal,
    Path(channel_id): Path<String>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiFailure> {
    channels::delete_channel_internal(&state, &principal, &channel_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(StatusResponse {
            status: String::from("deleted channel and associated messages"),
        }),
    ))
}

pub(crate) async fn add_member(
    State(state): State<AppState>,
    principal: Principal,
    Path(channel_id): Path<String>,
    Json(member): Json<Principal>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiFailure> {
    let member_id = member.id;
    channels::add_member_internal(&state, &principal, &channel_id, member).await?;
    Ok((
        StatusCode::CREATED,
        Json(StatusResponse {
            status: format!("user {member_id} added to members"),
        }),
    ))
}

pub(crate) async fn remove_member(
    State(state): State<AppState>,
    principal: Principal,
    Path(channel_id): Path<String>,
    Json(request): Json<RemoveMemberRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiFailure> {
    channels::remove_member_internal(&state, &principal, &channel_id, request.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(StatusResponse {
            status: format!("user {} removed from members", request.id),
        }),
    ))
}

pub(crate) async fn post_message(
    State(state): State<AppState>,
    principal: Principal,
    Path(channel_id): Path<String>,
    Json(request): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiFailure> {
    let message =
        messages::post_message_internal(&state, &principal, &channel_id, request.body).await?;
    Ok((StatusCode::CREATED, Json(message.response())))
}

pub(crate) async fn edit_message(
    State(state): State<AppState>,
    principal: Principal,
    Path(message_id): Path<String>,
    Json(request): Json<EditMessageRequest>,
) -> Result<Json<MessageResponse>, ApiFailure> {
    let message =
        messages::edit_message_internal(&state, &principal, &message_id, request.body).await?;
    Ok(Json(message.response()))
}

pub(crate) async fn delete_message(
    State(state): State<AppState>,
    principal: Principal,
    Path(message_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiFailure> {
    messages::delete_message_internal(&state, &principal, &message_id).await?;
    Ok(Json(StatusResponse {
        status: String::from("deleted message"),
    }))
}
