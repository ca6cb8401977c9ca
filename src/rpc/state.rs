//! Connection State Machine
//!
//! Per-connection protocol states on the transport server:
//!
//! ```text
//! ┌──────────────┐   register(id) ok   ┌──────────────┐
//! │ Unregistered │ ──────────────────► │  Registered  │
//! └──────┬───────┘                     └──────┬───────┘
//!        │ bad frame: error reply,            │ kill signal / EOF
//!        │ stay unregistered                  ▼
//!        │                             ┌──────────────┐
//!        │ EOF                         │   Closing    │
//!        │                             └──────┬───────┘
//!        │                                    │ session removed
//!        ▼                                    ▼
//!                    ┌──────────────┐
//!                    │    Closed    │
//!                    └──────────────┘
//! ```

use std::fmt;
use std::time::Instant;

/// Connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Waiting for the `register` handshake
    #[default]
    Unregistered,
    /// Handshake done; result frames are routed to the device session
    Registered,
    /// Kill signal or end-of-stream seen; tearing the session down
    Closing,
    /// Terminal
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unregistered => write!(f, "unregistered"),
            Self::Registered => write!(f, "registered"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// State machine for one device connection
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    state_changed_at: Instant,
    transition_count: u32,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Unregistered,
            state_changed_at: Instant::now(),
            transition_count: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Get time elapsed since last state change
    pub fn time_in_state(&self) -> std::time::Duration {
        self.state_changed_at.elapsed()
    }

    pub fn transition_count(&self) -> u32 {
        self.transition_count
    }

    /// Handshake accepted
    pub fn register(&mut self) -> Result<(), StateTransitionError> {
        match self.state {
            ConnectionState::Unregistered => {
                self.transition_to(ConnectionState::Registered);
                Ok(())
            }
            _ => Err(StateTransitionError::InvalidTransition {
                from: self.state,
                to: ConnectionState::Registered,
            }),
        }
    }

    /// Kill signal received or stream ended after registration
    pub fn start_closing(&mut self) -> Result<(), StateTransitionError> {
        match self.state {
            ConnectionState::Registered => {
                self.transition_to(ConnectionState::Closing);
                Ok(())
            }
            _ => Err(StateTransitionError::InvalidTransition {
                from: self.state,
                to: ConnectionState::Closing,
            }),
        }
    }

    /// Connection fully torn down. An unregistered connection may close
    /// directly; it never owned a session.
    pub fn close_complete(&mut self) -> Result<(), StateTransitionError> {
        match self.state {
            ConnectionState::Closing | ConnectionState::Unregistered => {
                self.transition_to(ConnectionState::Closed);
                Ok(())
            }
            _ => Err(StateTransitionError::InvalidTransition {
                from: self.state,
                to: ConnectionState::Closed,
            }),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.state == ConnectionState::Registered
    }

    pub fn is_terminal(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    fn transition_to(&mut self, new_state: ConnectionState) {
        tracing::debug!(
            "Connection state transition: {} -> {} (count: {})",
            self.state,
            new_state,
            self.transition_count + 1
        );
        self.state = new_state;
        self.state_changed_at = Instant::now();
        self.transition_count += 1;
    }
}

/// Error type for invalid state transitions
#[derive(Debug, Clone, thiserror::Error)]
pub enum StateTransitionError {
    #[error("Invalid connection state transition from {from} to {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}
