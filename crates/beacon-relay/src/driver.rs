//! Relay driver.
//!
//! Ties together the connection registry and room store, routing inbound
//! frames and producing the side effects to execute. The driver is pure
//! logic with no I/O: the runtime feeds it [`RelayEvent`]s and executes the
//! [`RelayAction`]s it returns. Processing one event to completion before
//! the next from the same connection preserves per-connection ordering.
//!
//! All shared state (registry + room store) lives behind the single lock
//! the runtime wraps the driver in. The critical sections are map inserts,
//! deletes, and roster snapshots, so one coarse lock is cheaper than
//! per-room locking and removes any lock-ordering hazard between the two
//! structures.

use beacon_proto::{ClientFrame, ServerFrame};
use chrono::SecondsFormat;
use serde_json::Value;

use crate::{
    clock::Clock,
    driver_error::DriverError,
    registry::ConnectionRegistry,
    room_store::{LeaveOutcome, RoomStore},
};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events the relay driver processes.
///
/// These are produced by the external runtime (production transport or a
/// test harness).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A new connection completed its handshake with a user identifier.
    ConnectionOpened {
        /// Unique connection ID assigned by the runtime.
        conn_id: u64,
        /// User identifier from the connection URI. Trusted as-is;
        /// authentication happened upstream.
        user_id: String,
    },

    /// A text frame was received from a connection.
    FrameReceived {
        /// Connection that sent the frame.
        conn_id: u64,
        /// Raw frame text (expected to be one JSON object).
        text: String,
    },

    /// A connection was closed (by peer or error).
    ConnectionClosed {
        /// Connection that was closed.
        conn_id: u64,
        /// Reason for closure.
        reason: String,
    },
}

/// Actions the relay driver produces.
///
/// Executed by runtime-specific code; the driver never touches sockets.
#[derive(Debug, Clone)]
pub enum RelayAction {
    /// Send a frame to a specific connection.
    Send {
        /// Target connection ID.
        conn_id: u64,
        /// Frame to send.
        frame: ServerFrame,
    },

    /// Send a frame to every current member of a room, the sender included.
    /// The executor resolves members to connections via
    /// [`RelayDriver::connections_in_room`].
    Broadcast {
        /// Target room ID.
        room_id: String,
        /// Frame to broadcast.
        frame: ServerFrame,
    },

    /// Force-close a connection.
    Close {
        /// Connection to close.
        conn_id: u64,
        /// Reason for closure.
        reason: String,
    },

    /// Log a message.
    Log {
        /// Log level.
        level: LogLevel,
        /// Message to log.
        message: String,
    },
}

/// Log levels for driver actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Event-driven relay driver.
///
/// Orchestrates connection lifecycle, room membership, and frame fan-out.
/// Generic over [`Clock`] so tests can pin the timestamps stamped onto
/// relayed messages.
#[derive(Debug)]
pub struct RelayDriver<C> {
    /// user id → connection mapping
    registry: ConnectionRegistry,
    /// Room membership and lifecycle
    rooms: RoomStore,
    /// Timestamp source for relayed messages
    clock: C,
    /// Relay configuration
    config: RelayConfig,
}

impl<C: Clock> RelayDriver<C> {
    /// Create a new relay driver.
    pub fn new(clock: C, config: RelayConfig) -> Self {
        Self { registry: ConnectionRegistry::new(), rooms: RoomStore::new(), clock, config }
    }

    /// Process one event and return the actions to execute.
    ///
    /// This is the main entry point for the driver.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, DriverError> {
        match event {
            RelayEvent::ConnectionOpened { conn_id, user_id } => {
                self.handle_connection_opened(conn_id, &user_id)
            },
            RelayEvent::FrameReceived { conn_id, text } => {
                self.handle_frame_received(conn_id, &text)
            },
            RelayEvent::ConnectionClosed { conn_id, reason } => {
                self.handle_connection_closed(conn_id, &reason)
            },
        }
    }

    /// Handle a new identified connection.
    ///
    /// If the user already has a live connection, that connection is torn
    /// down exactly like a disconnect (room leave broadcast included) and
    /// then force-closed, so stale sockets are never leaked. The new
    /// connection starts with no room; it does not inherit the old one's
    /// membership.
    fn handle_connection_opened(
        &mut self,
        conn_id: u64,
        user_id: &str,
    ) -> Result<Vec<RelayAction>, DriverError> {
        let mut actions = Vec::new();

        let stale = self.registry.connection_for_user(user_id);

        // A replacement keeps the connection count flat, so only genuinely
        // new users hit the cap.
        if stale.is_none() && self.registry.session_count() >= self.config.max_connections {
            return Ok(vec![RelayAction::Close {
                conn_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        if let Some(old_conn) = stale {
            actions.extend(self.teardown_session(old_conn));
            actions.push(RelayAction::Close {
                conn_id: old_conn,
                reason: "replaced by a newer connection".to_string(),
            });
            actions.push(RelayAction::Log {
                level: LogLevel::Info,
                message: format!(
                    "user {user_id} reconnected, closing stale connection {old_conn}"
                ),
            });
        }

        if !self.registry.register(conn_id, user_id) {
            return Err(DriverError::SessionAlreadyExists(conn_id));
        }

        actions.push(RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("connection {conn_id} registered for user {user_id}"),
        });

        Ok(actions)
    }

    /// Handle one inbound text frame.
    ///
    /// Malformed frames get an `error` reply and the connection stays up; a
    /// single bad frame never tears down the connection. Unknown frame
    /// kinds are logged and otherwise ignored.
    fn handle_frame_received(
        &mut self,
        conn_id: u64,
        text: &str,
    ) -> Result<Vec<RelayAction>, DriverError> {
        let user_id = self
            .registry
            .session(conn_id)
            .ok_or(DriverError::SessionNotFound(conn_id))?
            .user_id
            .clone();

        let frame = match ClientFrame::decode(text) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Ok(vec![RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!("ignoring unknown frame kind from user {user_id}"),
                }]);
            },
            Err(err) => return Ok(self.reject(conn_id, &user_id, &err)),
        };

        Ok(match frame {
            ClientFrame::CreateRoom { room_id } => {
                self.handle_create_room(conn_id, &user_id, &room_id)
            },
            ClientFrame::JoinRoom { room_id } => self.handle_join_room(conn_id, &user_id, &room_id),
            ClientFrame::LeaveRoom { room_id } => {
                self.handle_leave_room(conn_id, &user_id, &room_id)
            },
            ClientFrame::Message { room_id, message } => {
                self.handle_message(conn_id, &user_id, &room_id, message)
            },
        })
    }

    /// Handle a connection being closed.
    ///
    /// Performs the same membership removal and broadcast as an explicit
    /// leave, then drops the user from the registry. No-op for unknown
    /// connections: a stale connection's close can arrive after it was
    /// already replaced.
    fn handle_connection_closed(
        &mut self,
        conn_id: u64,
        reason: &str,
    ) -> Result<Vec<RelayAction>, DriverError> {
        if self.registry.session(conn_id).is_none() {
            return Ok(Vec::new());
        }

        let mut actions = self.teardown_session(conn_id);
        actions.push(RelayAction::Log {
            level: LogLevel::Info,
            message: format!("connection {conn_id} closed: {reason}"),
        });

        Ok(actions)
    }

    fn handle_create_room(
        &mut self,
        conn_id: u64,
        user_id: &str,
        room_id: &str,
    ) -> Vec<RelayAction> {
        if let Err(err) = self.rooms.create(room_id, user_id) {
            return self.reject(conn_id, user_id, &err);
        }

        // The creator implicitly leaves any prior room; a user is a member
        // of at most one room at a time.
        let mut actions = self.leave_current(conn_id, room_id);

        if let Some(info) = self.registry.session_mut(conn_id) {
            info.room = Some(room_id.to_string());
        }

        actions.push(RelayAction::Send {
            conn_id,
            frame: ServerFrame::RoomCreated { room_id: room_id.to_string() },
        });
        actions.push(RelayAction::Log {
            level: LogLevel::Info,
            message: format!("room {room_id} created by user {user_id}"),
        });

        actions
    }

    fn handle_join_room(&mut self, conn_id: u64, user_id: &str, room_id: &str) -> Vec<RelayAction> {
        let participants = match self.rooms.join(room_id, user_id) {
            Ok(participants) => participants,
            Err(err) => return self.reject(conn_id, user_id, &err),
        };

        // Implicit leave of the prior room. A same-room rejoin cannot reach
        // this point - it fails above with AlreadyInRoom.
        let mut actions = self.leave_current(conn_id, room_id);

        if let Some(info) = self.registry.session_mut(conn_id) {
            info.room = Some(room_id.to_string());
        }

        actions.push(RelayAction::Broadcast {
            room_id: room_id.to_string(),
            frame: ServerFrame::RoomJoined {
                room_id: room_id.to_string(),
                participants,
                user_id: user_id.to_string(),
            },
        });
        actions.push(RelayAction::Log {
            level: LogLevel::Debug,
            message: format!("user {user_id} joined room {room_id}"),
        });

        actions
    }

    /// Explicit leave. Never errors, even for unknown rooms or non-members.
    fn handle_leave_room(
        &mut self,
        conn_id: u64,
        user_id: &str,
        room_id: &str,
    ) -> Vec<RelayAction> {
        if let Some(info) = self.registry.session_mut(conn_id)
            && info.room.as_deref() == Some(room_id)
        {
            info.room = None;
        }

        self.leave_and_notify(user_id, room_id)
    }

    fn handle_message(
        &mut self,
        conn_id: u64,
        user_id: &str,
        room_id: &str,
        message: Value,
    ) -> Vec<RelayAction> {
        if let Err(err) = self.rooms.check_route(room_id, user_id) {
            return self.reject(conn_id, user_id, &err);
        }

        let timestamp = self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true);

        vec![RelayAction::Broadcast {
            room_id: room_id.to_string(),
            frame: ServerFrame::Message {
                sender_id: user_id.to_string(),
                room_id: room_id.to_string(),
                message,
                timestamp,
            },
        }]
    }

    /// Report a failed operation to the offending connection only.
    fn reject(
        &self,
        conn_id: u64,
        user_id: &str,
        err: &(impl std::fmt::Display + ?Sized),
    ) -> Vec<RelayAction> {
        let message = err.to_string();
        vec![
            RelayAction::Send { conn_id, frame: ServerFrame::Error { message: message.clone() } },
            RelayAction::Log {
                level: LogLevel::Warn,
                message: format!("rejected frame from user {user_id}: {message}"),
            },
        ]
    }

    /// Unregister a connection and remove it from its room, if any.
    fn teardown_session(&mut self, conn_id: u64) -> Vec<RelayAction> {
        let Some(info) = self.registry.unregister(conn_id) else {
            return Vec::new();
        };

        match info.room {
            Some(room) => self.leave_and_notify(&info.user_id, &room),
            None => Vec::new(),
        }
    }

    /// Leave the connection's current room, unless it is `joining` (the
    /// room the connection is about to be a member of).
    fn leave_current(&mut self, conn_id: u64, joining: &str) -> Vec<RelayAction> {
        let Some(info) = self.registry.session_mut(conn_id) else {
            return Vec::new();
        };
        let Some(room) = info.room.take() else {
            return Vec::new();
        };
        if room == joining {
            return Vec::new();
        }
        let user_id = info.user_id.clone();

        self.leave_and_notify(&user_id, &room)
    }

    /// Remove a user from a room and notify the remaining members. The room
    /// is deleted synchronously the moment its membership reaches zero.
    fn leave_and_notify(&mut self, user_id: &str, room_id: &str) -> Vec<RelayAction> {
        match self.rooms.leave(room_id, user_id) {
            LeaveOutcome::Deleted => vec![RelayAction::Log {
                level: LogLevel::Info,
                message: format!("room {room_id} is empty, deleted"),
            }],
            LeaveOutcome::Removed => vec![RelayAction::Broadcast {
                room_id: room_id.to_string(),
                frame: ServerFrame::ParticipantLeft { user_id: user_id.to_string() },
            }],
            LeaveOutcome::NotAMember => Vec::new(),
        }
    }

    /// Connections of every current member of a room. Used by the executor
    /// to resolve a [`RelayAction::Broadcast`].
    pub fn connections_in_room(&self, room_id: &str) -> Vec<u64> {
        self.rooms
            .participants(room_id)
            .unwrap_or_default()
            .iter()
            .filter_map(|user_id| self.registry.connection_for_user(user_id))
            .collect()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }

    /// Room exists.
    pub fn has_room(&self, room_id: &str) -> bool {
        self.rooms.has_room(room_id)
    }

    /// Sorted member list of a room. `None` if the room does not exist.
    pub fn participants(&self, room_id: &str) -> Option<Vec<String>> {
        self.rooms.participants(room_id)
    }

    /// Room a connection is currently in, if any.
    pub fn current_room(&self, conn_id: u64) -> Option<String> {
        self.registry.session(conn_id).and_then(|info| info.room.clone())
    }
}
