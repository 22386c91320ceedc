//! Persistence layer. Every operation runs against Postgres when a
//! pool is configured and against the in-memory maps otherwise; both
//! paths expose identical semantics. Member and creator summaries are
//! stored as serialized JSON text.

use sqlx::{postgres::PgRow, Row};

use super::{
    core::{AppState, ChannelRecord, MessageRecord},
    errors::ApiFailure,
    types::Principal,
};

const CREATE_CHANNELS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS channels (
                    channel_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT NULL,
                    private BOOLEAN NOT NULL DEFAULT FALSE,
                    members TEXT NOT NULL,
                    creator TEXT NOT NULL,
                    created_at_unix BIGINT NOT NULL,
                    edited_at_unix BIGINT NULL
                )";
const CREATE_MESSAGES_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS messages (
                    message_id TEXT PRIMARY KEY,
                    channel_id TEXT NOT NULL,
                    body TEXT NOT NULL,
                    creator TEXT NOT NULL,
                    created_at_unix BIGINT NOT NULL,
                    edited_at_unix BIGINT NULL
                )";
const CREATE_MESSAGES_CHANNEL_CREATED_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_messages_channel_created
                    ON messages(channel_id, created_at_unix DESC, message_id DESC)";

pub(crate) async fn ensure_db_schema(state: &AppState) -> Result<(), ApiFailure> {
    const SCHEMA_INIT_LOCK_ID: i64 = 0x5354_5241_4e44_3031;
    let Some(pool) = &state.db_pool else {
        return Ok(());
    };

    state
        .db_init
        .get_or_try_init(|| async move {
            let mut tx = pool.begin().await?;
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(SCHEMA_INIT_LOCK_ID)
                .execute(&mut *tx)
                .await?;

            sqlx::query(CREATE_CHANNELS_TABLE_SQL)
                .execute(&mut *tx)
                .await?;
            sqlx::query(CREATE_MESSAGES_TABLE_SQL)
                .execute(&mut *tx)
                .await?;
            sqlx::query(CREATE_MESSAGES_CHANNEL_CREATED_INDEX_SQL)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok::<(), sqlx::Error>(())
        })
        .await
        .map_err(|_| ApiFailure::Internal)?;
    Ok(())
}

fn encode_principal(principal: &Principal) -> Result<String, ApiFailure> {
    serde_json::to_string(principal).map_err(|_| ApiFailure::Internal)
}

fn encode_members(members: &[Principal]) -> Result<String, ApiFailure> {
    serde_json::to_string(members).map_err(|_| ApiFailure::Internal)
}

fn channel_from_row(row: &PgRow) -> Result<ChannelRecord, ApiFailure> {
    let members_raw: String = row.try_get("members").map_err(|_| ApiFailure::Internal)?;
    let creator_raw: String = row.try_get("creator").map_err(|_| ApiFailure::Internal)?;
    Ok(ChannelRecord {
        channel_id: row
            .try_get("channel_id")
            .map_err(|_| ApiFailure::Internal)?,
        name: row.try_get("name").map_err(|_| ApiFailure::Internal)?,
        description: row
            .try_get("description")
            .map_err(|_| ApiFailure::Internal)?,
        private: row.try_get("private").map_err(|_| ApiFailure::Internal)?,
        members: serde_json::from_str(&members_raw).map_err(|_| ApiFailure::Internal)?,
        creator: serde_json::from_str(&creator_raw).map_err(|_| ApiFailure::Internal)?,
        created_at_unix: row
            .try_get("created_at_unix")
            .map_err(|_| ApiFailure::Internal)?,
        edited_at_unix: row
            .try_get("edited_at_unix")
            .map_err(|_| ApiFailure::Internal)?,
    })
}

fn message_from_row(row: &PgRow) -> Result<MessageRecord, ApiFailure> {
    let creator_raw: String = row.try_get("creator").map_err(|_| ApiFailure::Internal)?;
    Ok(MessageRecord {
        message_id: row
            .try_get("message_id")
            .map_err(|_| ApiFailure::Internal)?,
        channel_id: row
            .try_get("channel_id")
            .map_err(|_| ApiFailure::Internal)?,
        body: row.try_get("body").map_err(|_| ApiFailure::Internal)?,
        creator: serde_json::from_str(&creator_raw).map_err(|_| ApiFailure::Internal)?,
        created_at_unix: row
            .try_get("created_at_unix")
            .map_err(|_| ApiFailure::Internal)?,
        edited_at_unix: row
            .try_get("edited_at_unix")
            .map_err(|_| ApiFailure::Internal)?,
    })
}

pub(crate) async fn insert_channel(
    state: &AppState,
    record: &ChannelRecord,
) -> Result<(), ApiFailure> {
    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let inserted = sqlx::query(
            "INSERT INTO channels
                (channel_id, name, description, private, members, creator, created_at_unix, edited_at_unix)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (channel_id) DO NOTHING",
        )
        .bind(&record.channel_id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(record.private)
        .bind(encode_members(&record.members)?)
        .bind(encode_principal(&record.creator)?)
        .bind(record.created_at_unix)
        .bind(record.edited_at_unix)
        .execute(pool)
        .await
        .map_err(|_| ApiFailure::Internal)?;
        if inserted.rows_affected() == 0 {
            return Err(ApiFailure::Conflict);
        }
        return Ok(());
    }

    let mut channels = state.channels.write().await;
    if channels.contains_key(&record.channel_id) {
        return Err(ApiFailure::Conflict);
    }
    channels.insert(record.channel_id.clone(), record.clone());
    Ok(())
}

pub(crate) async fn channel_by_id(
    state: &AppState,
    channel_id: &str,
) -> Result<Option<ChannelRecord>, ApiFailure> {
    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let row = sqlx::query(
            "SELECT channel_id, name, description, private, members, creator,
                    created_at_unix, edited_at_unix
             FROM channels WHERE channel_id = $1",
        )
        .bind(channel_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| ApiFailure::Internal)?;
        return row.as_ref().map(channel_from_row).transpose();
    }

    Ok(state.channels.read().await.get(channel_id).cloned())
}

pub(crate) async fn list_public_channels(
    state: &AppState,
) -> Result<Vec<ChannelRecord>, ApiFailure> {
    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let rows = sqlx::query(
            "SELECT channel_id, name, description, private, members, creator,
                    created_at_unix, edited_at_unix
             FROM channels WHERE private = FALSE
             ORDER BY created_at_unix ASC, channel_id ASC",
        )
        .fetch_all(pool)
        .await
        .map_err(|_| ApiFailure::Internal)?;
        return rows.iter().map(channel_from_row).collect();
    }

    let channels = state.channels.read().await;
    let mut public: Vec<ChannelRecord> = channels
        .values()
        .filter(|channel| !channel.private)
        .cloned()
        .collect();
    public.sort_by(|a, b| {
        (a.created_at_unix, &a.channel_id).cmp(&(b.created_at_unix, &b.channel_id))
    });
    Ok(public)
}

pub(crate) async fn list_channels_with_member(
    state: &AppState,
    user_id: i64,
) -> Result<Vec<ChannelRecord>, ApiFailure> {
    // Membership lives inside the serialized member list, so the
    // filter runs after decoding on both paths.
    let candidates = if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let rows = sqlx::query(
            "SELECT channel_id, name, description, private, members, creator,
                    created_at_unix, edited_at_unix
             FROM channels WHERE private = TRUE
             ORDER BY created_at_unix ASC, channel_id ASC",
        )
        .fetch_all(pool)
        .await
        .map_err(|_| ApiFailure::Internal)?;
        rows.iter()
            .map(channel_from_row)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        let channels = state.channels.read().await;
        let mut private: Vec<ChannelRecord> = channels
            .values()
            .filter(|channel| channel.private)
            .cloned()
            .collect();
        private.sort_by(|a, b| {
            (a.created_at_unix, &a.channel_id).cmp(&(b.created_at_unix, &b.channel_id))
        });
        private
    };

    Ok(candidates
        .into_iter()
        .filter(|channel| channel.members.iter().any(|member| member.id == user_id))
        .collect())
}

pub(crate) async fn update_channel(
    state: &AppState,
    record: &ChannelRecord,
) -> Result<(), ApiFailure> {
    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let updated = sqlx::query(
            "UPDATE channels
             SET name = $2, description = $3, members = $4, edited_at_unix = $5
             WHERE channel_id = $1",
        )
        .bind(&record.channel_id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(encode_members(&record.members)?)
        .bind(record.edited_at_unix)
        .execute(pool)
        .await
        .map_err(|_| ApiFailure::Internal)?;
        if updated.rows_affected() == 0 {
            return Err(ApiFailure::NotFound);
        }
        return Ok(());
    }

    let mut channels = state.channels.write().await;
    if !channels.contains_key(&record.channel_id) {
        return Err(ApiFailure::NotFound);
    }
    channels.insert(record.channel_id.clone(), record.clone());
    Ok(())
}

pub(crate) async fn delete_channel(state: &AppState, channel_id: &str) -> Result<bool, ApiFailure> {
    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let deleted = sqlx::query("DELETE FROM channels WHERE channel_id = $1")
            .bind(channel_id)
            .execute(pool)
            .await
            .map_err(|_| ApiFailure::Internal)?;
        return Ok(deleted.rows_affected() > 0);
    }

    Ok(state.channels.write().await.remove(channel_id).is_some())
}

pub(crate) async fn delete_channel_messages(
    state: &AppState,
    channel_id: &str,
) -> Result<u64, ApiFailure> {
    #[cfg(test)]
    if state
        .fail_message_cascade
        .load(std::sync::atomic::Ordering::Relaxed)
    {
        return Err(ApiFailure::Internal);
    }

    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let deleted = sqlx::query("DELETE FROM messages WHERE channel_id = $1")
            .bind(channel_id)
            .execute(pool)
            .await
            .map_err(|_| ApiFailure::Internal)?;
        return Ok(deleted.rows_affected());
    }

    let mut messages = state.messages.write().await;
    let before = messages.len();
    messages.retain(|_, message| message.channel_id != channel_id);
    Ok((before - messages.len()) as u64)
}

pub(crate) async fn insert_message(
    state: &AppState,
    record: &MessageRecord,
) -> Result<(), ApiFailure> {
    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let inserted = sqlx::query(
            "INSERT INTO messages
                (message_id, channel_id, body, creator, created_at_unix, edited_at_unix)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (message_id) DO NOTHING",
        )
        .bind(&record.message_id)
        .bind(&record.channel_id)
        .bind(&record.body)
        .bind(encode_principal(&record.creator)?)
        .bind(record.created_at_unix)
        .bind(record.edited_at_unix)
        .execute(pool)
        .await
        .map_err(|_| ApiFailure::Internal)?;
        if inserted.rows_affected() == 0 {
            return Err(ApiFailure::Conflict);
        }
        return Ok(());
    }

    let mut messages = state.messages.write().await;
    if messages.contains_key(&record.message_id) {
        return Err(ApiFailure::Conflict);
    }
    messages.insert(record.message_id.clone(), record.clone());
    Ok(())
}

pub(crate) async fn message_by_id(
    state: &AppState,
    message_id: &str,
) -> Result<Option<MessageRecord>, ApiFailure> {
    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let row = sqlx::query(
            "SELECT message_id, channel_id, body, creator, created_at_unix, edited_at_unix
             FROM messages WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| ApiFailure::Internal)?;
        return row.as_ref().map(message_from_row).transpose();
    }

    Ok(state.messages.read().await.get(message_id).cloned())
}

pub(crate) async fn update_message(
    state: &AppState,
    record: &MessageRecord,
) -> Result<(), ApiFailure> {
    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let updated = sqlx::query(
            "UPDATE messages SET body = $2, edited_at_unix = $3 WHERE message_id = $1",
        )
        .bind(&record.message_id)
        .bind(&record.body)
        .bind(record.edited_at_unix)
        .execute(pool)
        .await
        .map_err(|_| ApiFailure::Internal)?;
        if updated.rows_affected() == 0 {
            return Err(ApiFailure::NotFound);
        }
        return Ok(());
    }

    let mut messages = state.messages.write().await;
    if !messages.contains_key(&record.message_id) {
        return Err(ApiFailure::NotFound);
    }
    messages.insert(record.message_id.clone(), record.clone());
    Ok(())
}

pub(crate) async fn delete_message(state: &AppState, message_id: &str) -> Result<bool, ApiFailure> {
    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let deleted = sqlx::query("DELETE FROM messages WHERE message_id = $1")
            .bind(message_id)
            .execute(pool)
            .await
            .map_err(|_| ApiFailure::Internal)?;
        return Ok(deleted.rows_affected() > 0);
    }

    Ok(state.messages.write().await.remove(message_id).is_some())
}

/// Most recent `limit` messages in a channel, newest first. With a
/// cursor, only messages strictly earlier than the cursor message
/// (ordered by `created_at_unix`, message id as tiebreaker).
pub(crate) async fn list_messages(
    state: &AppState,
    channel_id: &str,
    before: Option<&MessageRecord>,
    limit: usize,
) -> Result<Vec<MessageRecord>, ApiFailure> {
    if let Some(pool) = &state.db_pool {
        ensure_db_schema(state).await?;
        let limit_i64 = i64::try_from(limit).map_err(|_| ApiFailure::Internal)?;
        let rows = sqlx::query(
            "SELECT message_id, channel_id, body, creator, created_at_unix, edited_at_unix
             FROM messages
             WHERE channel_id = $1
               AND ($2::bigint IS NULL
                    OR created_at_unix < $2
                    OR (created_at_unix = $2 AND message_id < $3))
             ORDER BY created_at_unix DESC, message_id DESC
             LIMIT $4",
        )
        .bind(channel_id)
        .bind(before.map(|cursor| cursor.created_at_unix))
        .bind(before.map(|cursor| cursor.message_id.clone()))
        .bind(limit_i64)
        .fetch_all(pool)
        .await
        .map_err(|_| ApiFailure::Internal)?;
        return rows.iter().map(message_from_row).collect();
    }

    let messages = state.messages.read().await;
    let mut page: Vec<MessageRecord> = messages
        .values()
        .filter(|message| message.channel_id == channel_id)
        .filter(|message| {
            before.is_none_or(|cursor| {
                (message.created_at_unix, &message.message_id)
                    < (cursor.created_at_unix, &cursor.message_id)
            })
        })
        .cloned()
        .collect();
    page.sort_by(|a, b| {
        (b.created_at_unix, &b.message_id).cmp(&(a.created_at_unix, &a.message_id))
    });
    page.truncate(limit);
    Ok(page)
}
