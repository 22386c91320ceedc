use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::anyhow;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::{OnceCell, RwLock};

use super::{
    publisher::EventPublisher,
    types::{ChannelResponse, MessageResponse, Principal},
};

pub const DEFAULT_JSON_BODY_LIMIT_BYTES: usize = 1_048_576;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 2;
pub const DEFAULT_QUEUE_TOPIC: &str = "messages";
/// Pagination ceiling for message history pages.
pub(crate) const MAX_MESSAGE_PAGE: usize = 100;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub publish_timeout: Duration,
    pub queue_brokers: Option<String>,
    pub queue_topic: String,
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_JSON_BODY_LIMIT_BYTES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            publish_timeout: Duration::from_secs(DEFAULT_PUBLISH_TIMEOUT_SECS),
            queue_brokers: None,
            queue_topic: String::from(DEFAULT_QUEUE_TOPIC),
            database_url: None,
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) db_pool: Option<PgPool>,
    pub(crate) db_init: Arc<OnceCell<()>>,
    pub(crate) channels: Arc<RwLock<HashMap<String, ChannelRecord>>>,
    pub(crate) messages: Arc<RwLock<HashMap<String, MessageRecord>>>,
    pub(crate) publisher: EventPublisher,
    /// Forces the message cascade to fail so the partial-failure path
    /// can be exercised.
    #[cfg(test)]
    pub(crate) fail_message_cascade: Arc<std::sync::atomic::AtomicBool>,
}

impl AppState {
    pub(crate) fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let db_pool = if let Some(database_url) = &config.database_url {
            Some(
                PgPoolOptions::new()
                    .max_connections(10)
                    .connect_lazy(database_url)
                    .map_err(|e| anyhow!("postgres pool init failed: {e}"))?,
            )
        } else {
            None
        };
        let publisher = EventPublisher::connect(config)?;

        Ok(Self {
            db_pool,
            db_init: Arc::new(OnceCell::new()),
            channels: Arc::new(RwLock::new(HashMap::new())),
            messages: Arc::new(RwLock::new(HashMap::new())),
            publisher,
            #[cfg(test)]
            fail_message_cascade: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ChannelRecord {
    pub(crate) channel_id: String,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) private: bool,
    pub(crate) members: Vec<Principal>,
    pub(crate) creator: Principal,
    pub(crate) created_at_unix: i64,
    pub(crate) edited_at_unix: Option<i64>,
}

impl ChannelRecord {
    pub(crate) fn response(&self) -> ChannelResponse {
        ChannelResponse {
            channel_id: self.channel_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            private: self.private,
            members: self.members.clone(),
            creator: self.creator.clone(),
            created_at_unix: self.created_at_unix,
            edited_at_unix: self.edited_at_unix,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MessageRecord {
    pub(crate) message_id: String,
    pub(crate) channel_id: String,
    pub(crate) body: String,
    pub(crate) creator: Principal,
    pub(crate) created_at_unix: i64,
    pub(crate) edited_at_unix: Option<i64>,
}

impl MessageRecord {
    pub(crate) fn response(&self) -> MessageResponse {
        MessageResponse {
            message_id: self.message_id.clone(),
            channel_id: self.channel_id.clone(),
            body: self.body.clone(),
            creator: self.creator.clone(),
            created_at_unix: self.created_at_unix,
            edited_at_unix: self.edited_at_unix,
        }
    }
}

pub(crate) fn now_unix() -> i64 {
    let now = SystemTime::now();
    let seconds = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs();
    i64::try_from(seconds).unwrap_or(i64::MAX)
}
