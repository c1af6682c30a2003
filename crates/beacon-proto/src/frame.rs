//! Inbound and outbound frame shapes.
//!
//! Frames carry opaque string identifiers (user ids, room ids) handed to the
//! relay by the surrounding application; the relay never interprets them.
//! The `message` payload is an arbitrary JSON value forwarded as-is, so the
//! chat and live-location flows can evolve without touching the relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;

/// A frame sent by a client to the relay.
///
/// # Invariants
///
/// - Kind Uniqueness: each variant maps to exactly one `type` string on the
///   wire (`create_room`, `join_room`, `leave_room`, `message`).
/// - Opaque Payload: `Message::message` is never inspected, only forwarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Create a room and become its host and first member.
    CreateRoom {
        /// Caller-specified opaque room token.
        room_id: String,
    },

    /// Join an existing room.
    JoinRoom {
        /// Room token to join.
        room_id: String,
    },

    /// Leave a room. Never an error, even if not a member.
    LeaveRoom {
        /// Room token to leave.
        room_id: String,
    },

    /// Relay an opaque payload to every member of a room.
    Message {
        /// Room token to fan out to.
        room_id: String,
        /// Opaque payload, forwarded unmodified.
        message: Value,
    },
}

impl ClientFrame {
    /// Frame kinds this relay understands, as they appear in `type`.
    pub const KINDS: [&'static str; 4] = ["create_room", "join_room", "leave_room", "message"];

    /// Decode one inbound text frame.
    ///
    /// Returns `Ok(None)` for a well-formed object whose `type` is not one of
    /// [`Self::KINDS`]. Unknown kinds are deliberately not an error: the
    /// relay logs and ignores them so old servers tolerate newer clients.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::InvalidJson`] if `text` is not a JSON object
    /// - [`ProtocolError::MissingType`] if the object has no string `type`
    /// - [`ProtocolError::InvalidFields`] if a known kind has the wrong shape
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        if !value.is_object() {
            return Err(ProtocolError::InvalidJson("expected a JSON object".to_string()));
        }

        let kind = match value.get("type").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => return Err(ProtocolError::MissingType),
        };

        if !Self::KINDS.contains(&kind.as_str()) {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ProtocolError::InvalidFields { kind, reason: e.to_string() })
    }
}

/// A frame sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// Room was created; sent to the host only.
    RoomCreated {
        /// Token of the new room.
        room_id: String,
    },

    /// A user joined; broadcast to every member including the joiner, with
    /// the full roster so all participants refresh from one event.
    RoomJoined {
        /// Room the join happened in.
        room_id: String,
        /// Complete current member list.
        participants: Vec<String>,
        /// The user who just joined.
        user_id: String,
    },

    /// A member left or disconnected; broadcast to the remaining members.
    ParticipantLeft {
        /// The user who left.
        user_id: String,
    },

    /// Relayed payload; broadcast to every member including the sender.
    Message {
        /// User the payload came from.
        sender_id: String,
        /// Room it was sent to.
        room_id: String,
        /// Opaque payload, exactly as received.
        message: Value,
        /// Server-assigned RFC 3339 UTC timestamp.
        timestamp: String,
    },

    /// An operation failed; sent to the offending connection only.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerFrame {
    /// Serialize to the single-line JSON text carried by one frame.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Encode`] if serialization fails. With string-keyed
    /// JSON values this does not happen in practice, but the relay logs
    /// rather than panics if it ever does.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}
