//! Message services.

use strand_core::{MessageBody, MessageId};
use strand_protocol::EventKind;

use super::{
    authz,
    core::{now_unix, AppState, MessageRecord},
    errors::ApiFailure,
    events, store,
    types::Principal,
};

pub(crate) async fn post_message_internal(
    state: &AppState,
    principal: &Principal,
    channel_id: &str,
    body: String,
) -> Result<MessageRecord, ApiFailure> {
    let channel = store::channel_by_id(state, channel_id)
        .await?
        .ok_or(ApiFailure::NotFound)?;
    if !authz::can_view(principal, &channel) {
        return Err(ApiFailure::Forbidden);
    }
    let body = MessageBody::try_from(body).map_err(|_| ApiFailure::InvalidRequest)?;

    let record = MessageRecord {
        message_id: MessageId::new().to_string(),
        channel_id: channel.channel_id.clone(),
        body: body.as_str().to_owned(),
        creator: principal.clone(),
        created_at_unix: now_unix(),
        edited_at_unix: None,
    };
    store::insert_message(state, &record).await?;

    tracing::info!(
        event = "messages.create",
        message_id = %record.message_id,
        channel_id = %record.channel_id,
        user_id = principal.id,
    );
    state
        .publisher
        .publish(
            &record.channel_id,
            EventKind::MessageNew,
            &record.response(),
            &events::recipients(&channel),
        )
        .await;
    Ok(record)
}

pub(crate) async fn edit_message_internal(
    state: &AppState,
    principal: &Principal,
    message_id: &str,
    body: String,
) -> Result<MessageRecord, ApiFailure> {
    let mut message = store::message_by_id(state, message_id)
        .await?
        .ok_or(ApiFailure::NotFound)?;
    if !authz::can_mutate_message(principal, &message) {
        return Err(ApiFailure::Forbidden);
    }
    let body = MessageBody::try_from(body).map_err(|_| ApiFailure::InvalidRequest)?;

    message.body = body.as_str().to_owned();
    message.edited_at_unix = Some(now_unix());
    store::update_message(state, &message).await?;

    let recipients = store::channel_by_id(state, &message.channel_id)
        .await?
        .as_ref()
        .map_or_else(Vec::new, events::recipients);

    tracing::info!(
        event = "messages.update",
        message_id = %message.message_id,
        channel_id = %message.channel_id,
        user_id = principal.id,
    );
    state
        .publisher
        .publish(
            &message.channel_id,
            EventKind::MessageUpdate,
            &message.response(),
            &recipients,
        )
        .await;
    Ok(message)
}

pub(crate) async fn delete_message_internal(
    state: &AppState,
    principal: &Principal,
    message_id: &str,
) -> Result<(), ApiFailure> {
    let message = store::message_by_id(state, message_id)
        .await?
        .ok_or(ApiFailure::NotFound)?;
    if !authz::can_mutate_message(principal, &message) {
        return Err(ApiFailure::Forbidden);
    }

    if !store::delete_message(state, message_id).await? {
        return Err(ApiFailure::NotFound);
    }
    let recipients = store::channel_by_id(state, &message.channel_id)
        .await?
        .as_ref()
        .map_or_else(Vec::new, events::recipients);

    tracing::info!(
        event = "messages.delete",
        message_id = %message.message_id,
        channel_id = %message.channel_id,
        user_id = principal.id,
    );
    state
        .publisher
        .publish(
            &message.channel_id,
            EventKind::MessageDelete,
            &message.message_id,
            &recipients,
        )
        .await;
    Ok(())
}
