//! Room store: creation, membership, and teardown of ephemeral rooms.
//!
//! Rooms must be explicitly created (no lazy creation on join) so a typo'd
//! room token is an error rather than a fresh empty room. A room's life is
//! bounded by its membership: the moment the member set becomes empty the
//! room is deleted synchronously, so room existence always implies at least
//! one member.
//!
//! The store holds user identifiers only. Resolving a member to a live
//! connection is the registry's job; the store never touches transports.

use std::collections::{HashMap, HashSet};

/// Errors from room operations.
///
/// All variants are non-fatal: the driver reports them to the offending
/// connection as an `error` frame and keeps processing. The `Display` text
/// is what the client sees.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// Room token is already taken.
    #[error("Room already exists: {0}")]
    RoomAlreadyExists(String),

    /// Room token is unknown.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Joining user is already a member of that room.
    #[error("User {user} is already in room {room}")]
    AlreadyInRoom {
        /// The joining user.
        user: String,
        /// The room they are already in.
        room: String,
    },

    /// Sender is not a member of the room it is routing to.
    #[error("User {user} is not a member of room {room}")]
    SenderNotInRoom {
        /// The sending user.
        user: String,
        /// The room they tried to route to.
        room: String,
    },
}

/// Outcome of removing a user from a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Room unknown or user was not a member. Deliberately not an error:
    /// leave is idempotent and a disconnect may race an explicit leave.
    NotAMember,
    /// User removed; the room still has members to notify.
    Removed,
    /// User was the last member; the room was deleted.
    Deleted,
}

/// One ephemeral room.
///
/// # Invariants
///
/// - `members` contains `host` at creation time (the host may later leave
///   while others remain; the room survives until empty).
/// - `members` is never empty while the room exists in the store.
#[derive(Debug, Clone)]
struct Room {
    /// User who created the room.
    host: String,
    /// Current member user ids. Order is irrelevant.
    members: HashSet<String>,
}

/// Store of all live rooms, keyed by opaque room token.
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: HashMap<String, Room>,
}

impl RoomStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a room exists.
    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Check if a user is a member of a room.
    pub fn is_member(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms.get(room_id).is_some_and(|r| r.members.contains(user_id))
    }

    /// Host of a room. `None` if the room does not exist.
    pub fn host(&self, room_id: &str) -> Option<&str> {
        self.rooms.get(room_id).map(|r| r.host.as_str())
    }

    /// Current member list of a room, sorted for deterministic output.
    /// `None` if the room does not exist.
    pub fn participants(&self, room_id: &str) -> Option<Vec<String>> {
        self.rooms.get(room_id).map(|room| {
            let mut members: Vec<String> = room.members.iter().cloned().collect();
            members.sort_unstable();
            members
        })
    }

    /// Create a room with the host as its first member.
    ///
    /// # Errors
    ///
    /// [`RoomError::RoomAlreadyExists`] if the token is taken. Tokens are
    /// caller-chosen, so collisions are reported rather than resolved.
    pub fn create(&mut self, room_id: &str, host_id: &str) -> Result<(), RoomError> {
        if self.has_room(room_id) {
            return Err(RoomError::RoomAlreadyExists(room_id.to_string()));
        }

        let mut members = HashSet::new();
        members.insert(host_id.to_string());
        self.rooms.insert(room_id.to_string(), Room { host: host_id.to_string(), members });

        Ok(())
    }

    /// Add a user to a room, returning the full roster after the join.
    ///
    /// # Errors
    ///
    /// - [`RoomError::RoomNotFound`] if the token is unknown
    /// - [`RoomError::AlreadyInRoom`] if the user is already a member
    pub fn join(&mut self, room_id: &str, user_id: &str) -> Result<Vec<String>, RoomError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;

        if !room.members.insert(user_id.to_string()) {
            return Err(RoomError::AlreadyInRoom {
                user: user_id.to_string(),
                room: room_id.to_string(),
            });
        }

        let mut members: Vec<String> = room.members.iter().cloned().collect();
        members.sort_unstable();
        Ok(members)
    }

    /// Remove a user from a room, deleting the room if it becomes empty.
    ///
    /// Idempotent: unknown rooms and non-members yield
    /// [`LeaveOutcome::NotAMember`] and mutate nothing.
    pub fn leave(&mut self, room_id: &str, user_id: &str) -> LeaveOutcome {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return LeaveOutcome::NotAMember;
        };

        if !room.members.remove(user_id) {
            return LeaveOutcome::NotAMember;
        }

        if room.members.is_empty() {
            self.rooms.remove(room_id);
            return LeaveOutcome::Deleted;
        }

        LeaveOutcome::Removed
    }

    /// Verify a sender may route a payload to a room.
    ///
    /// # Errors
    ///
    /// - [`RoomError::RoomNotFound`] if the token is unknown
    /// - [`RoomError::SenderNotInRoom`] if the sender is not a member
    pub fn check_route(&self, room_id: &str, sender_id: &str) -> Result<(), RoomError> {
        let room = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))?;

        if !room.members.contains(sender_id) {
            return Err(RoomError::SenderNotInRoom {
                user: sender_id.to_string(),
                room: room_id.to_string(),
            });
        }

        Ok(())
    }
}
