//! Connection state shared by the transports
//!
//! ```text
//! Disconnected ──connect()──> Connecting ──ok──> Connected
//!      ^                          │                  │
//!      └────────── error ─────────┘     peer gone ───┘
//!
//! any state ──close()──> Closed (terminal)
//! ```

use std::sync::{Mutex, PoisonError};

/// Transport connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; `connect` may be called
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Ready to carry payloads
    Connected,
    /// Closed by the owner; never reopened
    Closed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    pub fn is_closed(self) -> bool {
        self == ConnectionState::Closed
    }
}

/// Mutex-guarded [`ConnectionState`] that transports share with their tasks
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<ConnectionState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    pub fn get(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the state unless it is already `Closed`
    ///
    /// Returns false if the cell was closed and nothing changed.
    pub fn set(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_closed() {
            return false;
        }
        *state = next;
        true
    }

    /// Move to `Closed`; true only for the call that actually closed it
    pub fn close(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_closed() {
            return false;
        }
        *state = ConnectionState::Closed;
        true
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
