//! Huddle wire protocol definitions.
//!
//! JSON event types exchanged between clients and the presence server, plus
//! the normalization helpers both sides agree on. Events travel as one JSON
//! object per WebSocket text frame, discriminated by a `type` field.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

/// Display name stored for a peer that joins without one.
pub const DEFAULT_DISPLAY_NAME: &str = "Guest";

/// Canonical room identifier.
///
/// Room ids are case-insensitive and whitespace-trimmed on the wire;
/// internally they are always stored uppercased. Construction goes through
/// [`RoomId::normalize`], so two ids that differ only in case or surrounding
/// whitespace compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Normalize a raw room id: trim, then uppercase.
    ///
    /// Returns `None` when nothing is left after trimming; an empty id is
    /// invalid and must never become a registry key.
    pub fn normalize(raw: &str) -> Option<Self> {
        let canonical = raw.trim().to_uppercase();
        if canonical.is_empty() {
            None
        } else {
            Some(Self(canonical))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity and media-session handle of one present peer.
///
/// `media_session_id` is an opaque correlation handle owned by the external
/// media-negotiation exchange; the presence server stores and reports it but
/// never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    pub uid: String,
    pub display_name: String,
    pub media_session_id: String,
}

/// Trim a submitted display name, falling back to the default when the
/// field was absent or blank.
pub fn normalize_display_name(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => DEFAULT_DISPLAY_NAME.to_string(),
    }
}

/// Error codes carried in negative acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// A required field was missing or empty after normalization.
    #[serde(rename = "BAD_REQUEST")]
    BadRequest,
}

/// Lifecycle events sent by clients.
///
/// All fields default when absent so that an incomplete `join` decodes and
/// is answered with a negative ack instead of being dropped as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    Join {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        uid: String,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        media_session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Leave {
        #[serde(default)]
        room_id: String,
        #[serde(default)]
        uid: String,
    },
}

/// Events sent by the server: the join acknowledgment plus the room
/// fan-out notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    JoinAck {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peers: Option<Vec<PeerRecord>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorCode>,
    },
    #[serde(rename_all = "camelCase")]
    UserJoined {
        uid: String,
        display_name: String,
        media_session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft { uid: String },
}

impl ServerEvent {
    /// Positive join acknowledgment carrying the post-insert room snapshot.
    pub fn ack_ok(peers: Vec<PeerRecord>) -> Self {
        Self::JoinAck {
            ok: true,
            peers: Some(peers),
            error: None,
        }
    }

    /// Negative join acknowledgment for a validation failure.
    pub fn ack_bad_request() -> Self {
        Self::JoinAck {
            ok: false,
            peers: None,
            error: Some(ErrorCode::BadRequest),
        }
    }
}

/// Encode an event into its wire form (one JSON text frame).
pub fn encode_event<M: Serialize>(event: &M) -> String {
    serde_json::to_string(event).expect("event serialization cannot fail")
}

/// Decode a single wire frame into an event.
pub fn decode_event<M: DeserializeOwned>(text: &str) -> serde_json::Result<M> {
    serde_json::from_str(text)
}
