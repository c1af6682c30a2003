//! Wire format for the Beacon relay.
//!
//! Every message exchanged with the relay is one UTF-8 JSON object per text
//! frame, discriminated by a `type` field. This crate defines the inbound
//! ([`ClientFrame`]) and outbound ([`ServerFrame`]) shapes and the decode
//! errors. It performs no I/O; the relay crate owns transport and routing.
//!
//! Field names on the wire are camelCase (`roomId`, `senderId`) to match the
//! browser clients; frame kinds are snake_case (`create_room`, `join_room`).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod frame;

pub use errors::ProtocolError;
pub use frame::{ClientFrame, ServerFrame};
