//! Authentication session with persistent storage.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::storage::{self, KeyValueStore, SESSION_KEY};

/// Stored session data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub username: String,
    /// Bearer credential. Absent when the session was established some other
    /// way (e.g. restored without a token); the push channel then connects
    /// unauthenticated and lets the server decide.
    pub token: Option<String>,
}

/// Shared, interior-mutable view of the current session.
///
/// Cloning is cheap; every clone observes the same login/logout.
#[derive(Clone, Debug, Default)]
pub struct SessionHandle {
    session: Arc<RwLock<Option<AuthSession>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle pre-populated from persisted storage, if a session was saved.
    pub fn restore(store: &dyn KeyValueStore) -> Self {
        let handle = Self::new();
        if let Some(session) = storage::load::<AuthSession>(store, SESSION_KEY) {
            handle.set(Some(session));
        }
        handle
    }

    /// Login and persist the session.
    pub fn login(&self, session: AuthSession, store: &dyn KeyValueStore) {
        storage::save(store, SESSION_KEY, &session);
        self.set(Some(session));
    }

    /// Logout and clear the persisted session.
    pub fn logout(&self, store: &dyn KeyValueStore) {
        storage::remove(store, SESSION_KEY);
        self.set(None);
    }

    /// Check if user is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    pub fn username(&self) -> Option<String> {
        self.current().map(|s| s.username)
    }

    pub fn current(&self) -> Option<AuthSession> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Resolve the credential token: in-memory session first, then the
    /// persisted session.
    pub fn resolve_token(&self, store: &dyn KeyValueStore) -> Option<String> {
        self.current()
            .and_then(|s| s.token)
            .or_else(|| storage::load::<AuthSession>(store, SESSION_KEY).and_then(|s| s.token))
    }

    fn set(&self, session: Option<AuthSession>) {
        match self.session.write() {
            Ok(mut guard) => *guard = session,
            Err(poisoned) => *poisoned.into_inner() = session,
        }
    }
}
