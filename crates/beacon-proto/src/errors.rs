//! Decode errors for inbound frames.

/// Errors from decoding an inbound text frame.
///
/// All variants are non-fatal to the connection: the relay answers with an
/// `error` frame and keeps reading. An unrecognized frame kind is NOT an
/// error (see [`crate::ClientFrame::decode`]).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON, or not a JSON object.
    #[error("invalid frame: {0}")]
    InvalidJson(String),

    /// Frame object has no string `type` field.
    #[error("frame has no type field")]
    MissingType,

    /// Frame kind is known but the fields do not match its shape.
    #[error("invalid {kind} frame: {reason}")]
    InvalidFields {
        /// Frame kind from the `type` field.
        kind: String,
        /// Deserializer message.
        reason: String,
    },

    /// Outbound frame failed to serialize.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}
