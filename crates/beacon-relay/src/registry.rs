//! Connection registry mapping user ids to live connections.
//!
//! The registry maintains bidirectional mappings: connection id → session
//! state and user id → connection id. The reverse index enforces the core
//! invariant that a user has at most one live connection; installing a new
//! connection for a user is the driver's cue to tear the old one down first.
//!
//! The registry never owns transports. A connection id is an opaque handle
//! minted by the runtime; resolving it to a socket is the runtime's job.

use std::collections::HashMap;

/// State tracked for one registered connection.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// User identifier supplied at connect time. Opaque to the relay.
    pub user_id: String,
    /// Room the connection is currently a member of, if any.
    pub room: Option<String>,
}

impl SessionInfo {
    /// Create session state for a freshly identified connection.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), room: None }
    }
}

/// Registry tracking exactly one live connection per user identifier.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Connection ID → session state
    sessions: HashMap<u64, SessionInfo>,
    /// User ID → connection ID (reverse index). Enforces one connection per
    /// user
    user_sessions: HashMap<String, u64>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for a user.
    ///
    /// Returns `false` if the connection id is already registered or the
    /// user already has a live connection. The caller must unregister any
    /// previous connection for this user first (and close its transport),
    /// so stale sockets are never silently leaked.
    pub fn register(&mut self, conn_id: u64, user_id: &str) -> bool {
        if self.sessions.contains_key(&conn_id) || self.user_sessions.contains_key(user_id) {
            return false;
        }

        self.user_sessions.insert(user_id.to_string(), conn_id);
        self.sessions.insert(conn_id, SessionInfo::new(user_id));
        true
    }

    /// Unregister a connection, cleaning up the reverse index.
    ///
    /// Returns the session state if the connection existed. No-op for an
    /// unknown connection id, because a teardown can race a replacement.
    pub fn unregister(&mut self, conn_id: u64) -> Option<SessionInfo> {
        let info = self.sessions.remove(&conn_id)?;

        // Only drop the reverse entry if it still points at this connection;
        // a replacement may already have claimed the user id.
        if self.user_sessions.get(&info.user_id) == Some(&conn_id) {
            self.user_sessions.remove(&info.user_id);
        }

        Some(info)
    }

    /// Session state for a connection. `None` if it is not registered.
    pub fn session(&self, conn_id: u64) -> Option<&SessionInfo> {
        self.sessions.get(&conn_id)
    }

    /// Mutable session state for a connection.
    pub fn session_mut(&mut self, conn_id: u64) -> Option<&mut SessionInfo> {
        self.sessions.get_mut(&conn_id)
    }

    /// Connection id currently registered for a user, if any. O(1) via the
    /// reverse index.
    pub fn connection_for_user(&self, user_id: &str) -> Option<u64> {
        self.user_sessions.get(user_id).copied()
    }

    /// Number of registered connections.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register(1, "u1"));
        assert_eq!(registry.connection_for_user("u1"), Some(1));

        let info = registry.session(1).unwrap();
        assert_eq!(info.user_id, "u1");
        assert!(info.room.is_none());
    }

    #[test]
    fn register_duplicate_connection_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register(1, "u1"));
        assert!(!registry.register(1, "u2"));
    }

    #[test]
    fn register_second_connection_for_user_fails() {
        let mut registry = ConnectionRegistry::new();

        assert!(registry.register(1, "u1"));
        assert!(!registry.register(2, "u1"));
        assert_eq!(registry.connection_for_user("u1"), Some(1));
    }

    #[test]
    fn unregister_returns_session_state() {
        let mut registry = ConnectionRegistry::new();

        registry.register(1, "u1");
        registry.session_mut(1).unwrap().room = Some("R1".to_string());

        let info = registry.unregister(1).unwrap();
        assert_eq!(info.user_id, "u1");
        assert_eq!(info.room.as_deref(), Some("R1"));

        assert!(registry.session(1).is_none());
        assert_eq!(registry.connection_for_user("u1"), None);
    }

    #[test]
    fn unregister_unknown_connection_is_noop() {
        let mut registry = ConnectionRegistry::new();
        assert!(registry.unregister(99).is_none());
    }

    #[test]
    fn replace_flow_preserves_new_registration() {
        let mut registry = ConnectionRegistry::new();

        registry.register(1, "u1");

        // Driver replaces: unregister old, register new.
        registry.unregister(1);
        assert!(registry.register(2, "u1"));

        // A late teardown of the old connection must not evict the new one.
        assert!(registry.unregister(1).is_none());
        assert_eq!(registry.connection_for_user("u1"), Some(2));
    }

    #[test]
    fn session_count() {
        let mut registry = ConnectionRegistry::new();

        assert_eq!(registry.session_count(), 0);
        registry.register(1, "u1");
        registry.register(2, "u2");
        assert_eq!(registry.session_count(), 2);
        registry.unregister(1);
        assert_eq!(registry.session_count(), 1);
    }
}
