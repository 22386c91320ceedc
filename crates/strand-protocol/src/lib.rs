#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Maximum allowed size of a serialized queue envelope.
pub const MAX_EVENT_BYTES: usize = 64 * 1024;

/// Tag of a domain change event, one per mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "channel-new")]
    ChannelNew,
    #[serde(rename = "channel-update")]
    ChannelUpdate,
    #[serde(rename = "channel-delete")]
    ChannelDelete,
    #[serde(rename = "message-new")]
    MessageNew,
    #[serde(rename = "message-update")]
    MessageUpdate,
    #[serde(rename = "message-delete")]
    MessageDelete,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChannelNew => "channel-new",
            Self::ChannelUpdate => "channel-update",
            Self::ChannelDelete => "channel-delete",
            Self::MessageNew => "message-new",
            Self::MessageUpdate => "message-update",
            Self::MessageDelete => "message-delete",
        }
    }
}

/// Queue envelope handed to the fan-out collaborator. An empty
/// `userIDs` list means broadcast to every connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: T,
    #[serde(rename = "userIDs")]
    pub user_ids: Vec<String>,
}

/// Serialize an envelope for the outbound queue.
///
/// # Errors
/// Returns [`ProtocolError`] if the payload does not serialize or the
/// encoded envelope exceeds [`MAX_EVENT_BYTES`].
pub fn encode_envelope<T: Serialize>(
    kind: EventKind,
    payload: T,
    user_ids: Vec<String>,
) -> Result<String, ProtocolError> {
    let envelope = Envelope {
        kind,
        payload,
        user_ids,
    };
    let encoded = serde_json::to_string(&envelope)?;
    if encoded.len() > MAX_EVENT_BYTES {
        return Err(ProtocolError::OversizedPayload {
            max: MAX_EVENT_BYTES,
            actual: encoded.len(),
        });
    }
    Ok(encoded)
}

/// Parse and validate an envelope at the queue boundary.
///
/// # Errors
/// Returns [`ProtocolError`] if the input exceeds limits, is malformed
/// JSON, or carries an unknown event tag.
pub fn parse_envelope(input: &[u8]) -> Result<Envelope<serde_json::Value>, ProtocolError> {
    if input.len() > MAX_EVENT_BYTES {
        return Err(ProtocolError::OversizedPayload {
            max: MAX_EVENT_BYTES,
            actual: input.len(),
        });
    }

    Ok(serde_json::from_slice(input)?)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload exceeds max size: max={max} bytes actual={actual} bytes")]
    OversizedPayload { max: usize, actual: usize },
    #[error("invalid json payload")]
    InvalidJson,
}

impl From<serde_json::Error> for ProtocolError {
    fn from(_: serde_json::Error) -> Self {
        Self::InvalidJson
    }
}
