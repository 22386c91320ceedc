//! Channel services. Handlers stay thin; validation, authorization,
//! storage, and event publication all happen here.

use std::collections::HashSet;

use strand_core::{ChannelId, ChannelName, MessageId};
use strand_protocol::EventKind;

use super::{
    authz,
    core::{now_unix, AppState, ChannelRecord, MessageRecord, MAX_MESSAGE_PAGE},
    errors::ApiFailure,
    events, store,
    types::{CreateChannelRequest, Principal, UpdateChannelRequest},
};

pub(crate) async fn create_channel_internal(
    state: &AppState,
    principal: &Principal,
    request: CreateChannelRequest,
) -> Result<ChannelRecord, ApiFailure> {
    let name = ChannelName::try_from(request.name).map_err(|_| ApiFailure::InvalidRequest)?;

    let record = ChannelRecord {
        channel_id: ChannelId::new().to_string(),
        name: name.as_str().to_owned(),
        description: request.description,
        private: request.private,
        members: request.members,
        creator: principal.clone(),
        created_at_unix: now_unix(),
        edited_at_unix: None,
    };
    store::insert_channel(state, &record).await?;

    tracing::info!(
        event = "channels.create",
        channel_id = %record.channel_id,
        user_id = principal.id,
        private = record.private,
    );
    state
        .publisher
        .publish(
            &record.channel_id,
            EventKind::ChannelNew,
            &record.response(),
            &events::recipients(&record),
        )
        .await;
    Ok(record)
}

/// All public channels plus the private channels the caller belongs
/// to, deduplicated by id.
pub(crate) async fn list_channels_internal(
    state: &AppState,
    principal: &Principal,
) -> Result<Vec<ChannelRecord>, ApiFailure> {
    let mut listed = store::list_public_channels(state).await?;
    let mut seen: HashSet<String> = listed
        .iter()
        .map(|channel| channel.channel_id.clone())
        .collect();
    for channel in store::list_channels_with_member(state, principal.id).await? {
        if seen.insert(channel.channel_id.clone()) {
            listed.push(channel);
        }
    }
    Ok(listed)
}

pub(crate) async fn get_channel_internal(
    state: &AppState,
    principal: &Principal,
    channel_id: &str,
) -> Result<ChannelRecord, ApiFailure> {
    let channel = store::channel_by_id(state, channel_id)
        .await?
        .ok_or(ApiFailure::NotFound)?;
    if !authz::can_view(principal, &channel) {
        return Err(ApiFailure::Forbidden);
    }
    Ok(channel)
}

pub(crate) async fn list_channel_messages_internal(
    state: &AppState,
    principal: &Principal,
    channel_id: &str,
    before: Option<String>,
) -> Result<Vec<MessageRecord>, ApiFailure> {
    let channel = get_channel_internal(state, principal, channel_id).await?;

    let cursor = match before {
        Some(raw) => {
            let message_id = MessageId::try_from(raw).map_err(|_| ApiFailure::NotFound)?;
            let message = store::message_by_id(state, &message_id.to_string())
                .await?
                .ok_or(ApiFailure::NotFound)?;
            if message.channel_id != channel.channel_id {
                return Err(ApiFailure::NotFound);
            }
            Some(message)
        }
        None => None,
    };

    store::list_messages(state, channel_id, cursor.as_ref(), MAX_MESSAGE_PAGE).await
}

pub(crate) async fn update_channel_internal(
    state: &AppState,
    principal: &Principal,
    channel_id: &str,
    request: UpdateChannelRequest,
) -> Result<ChannelRecord, ApiFailure> {
    let mut channel = store::channel_by_id(state, channel_id)
        .await?
        .ok_or(ApiFailure::NotFound)?;
    if !authz::can_mutate_channel(principal, &channel) {
        return Err(ApiFailure::Forbidden);
    }

    if let Some(name) = request.name {
        let name = ChannelName::try_from(name).map_err(|_| ApiFailure::InvalidRequest)?;
        channel.name = name.as_str().to_owned();
    }
    if let Some(description) = request.description {
        channel.description = Some(description);
    }
    channel.edited_at_unix = Some(now_unix());
    store::update_channel(state, &channel).await?;

    tracing::info!(
        event = "channels.update",
        channel_id = %channel.channel_id,
        user_id = principal.id,
    );
    state
        .publisher
        .publish(
            &channel.channel_id,
            EventKind::ChannelUpdate,
            &channel.response(),
            &events::recipients(&channel),
        )
        .await;
    Ok(channel)
}

/// Deletes the channel, then its messages. A failed message cascade
/// leaves the channel gone; the caller gets a distinct error and the
/// deletion event still goes out.
pub(crate) async fn delete_channel_internal(
    state: &AppState,
    principal: &Principal,
    channel_id: &str,
) -> Result<(), ApiFailure> {
    let channel = store::channel_by_id(state, channel_id)
        .await?
        .ok_or(ApiFailure::NotFound)?;
    if !authz::can_mutate_channel(principal, &channel) {
        return Err(ApiFailure::Forbidden);
    }

    let recipients = events::recipients(&channel);
    if !store::delete_channel(state, channel_id).await? {
        return Err(ApiFailure::NotFound);
    }
    let cascade = store::delete_channel_messages(state, channel_id).await;

    tracing::info!(
        event = "channels.delete",
        channel_id = %channel.channel_id,
        user_id = principal.id,
        cascade_ok = cascade.is_ok(),
    );
    state
        .publisher
        .publish(
            &channel.channel_id,
            EventKind::ChannelDelete,
            &channel.channel_id,
            &recipients,
        )
        .await;

    match cascade {
        Ok(_) => Ok(()),
        Err(_) => Err(ApiFailure::CascadeIncomplete),
    }
}

/// Appends unconditionally; duplicate entries are the caller's
/// responsibility to avoid.
pub(crate) async fn add_member_internal(
    state: &AppState,
    principal: &Principal,
    channel_id: &str,
    member: Principal,
) -> Result<ChannelRecord, ApiFailure> {
    let mut channel = store::channel_by_id(state, channel_id)
        .await?
        .ok_or(ApiFailure::NotFound)?;
    if !authz::can_mutate_channel(principal, &channel) {
        return Err(ApiFailure::Forbidden);
    }

    channel.members.push(member);
    channel.edited_at_unix = Some(now_unix());
    store::update_channel(state, &channel).await?;

    tracing::info!(
        event = "channels.member_add",
        channel_id = %channel.channel_id,
        user_id = principal.id,
    );
    state
        .publisher
        .publish(
            &channel.channel_id,
            EventKind::ChannelUpdate,
            &channel.response(),
            &events::recipients(&channel),
        )
        .await;
    Ok(channel)
}

/// Removes the first matching entry. Removing an absent member is not
/// an error, but it is not a mutation either: nothing is persisted and
/// no event goes out.
pub(crate) async fn remove_member_internal(
    state: &AppState,
    principal: &Principal,
    channel_id: &str,
    member_id: i64,
) -> Result<ChannelRecord, ApiFailure> {
    let mut channel = store::channel_by_id(state, channel_id)
        .await?
        .ok_or(ApiFailure::NotFound)?;
    if !authz::can_mutate_channel(principal, &channel) {
        return Err(ApiFailure::Forbidden);
    }

    let Some(index) = channel
        .members
        .iter()
        .position(|member| member.id == member_id)
    else {
        return Ok(channel);
    };
    channel.members.remove(index);
    channel.edited_at_unix = Some(now_unix());
    store::update_channel(state, &channel).await?;

    tracing::info!(
        event = "channels.member_remove",
        channel_id = %channel.channel_id,
        user_id = principal.id,
        member_id,
    );
    state
        .publisher
        .publish(
            &channel.channel_id,
            EventKind::ChannelUpdate,
            &channel.response(),
            &events::recipients(&channel),
        )
        .await;
    Ok(channel)
}
