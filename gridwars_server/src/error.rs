// Error types for the game server.
//
// `HandlerError` is what a dispatcher handler returns when an inbound event
// cannot be applied. The dispatcher never propagates it further: it logs the
// error and, when a session is identifiable, force-disconnects that session.
// Framing and connection errors never show up here; the upstream connection
// recovers from those on its own by reconnecting.

use std::io;

use gridwars_protocol::SessionId;
use thiserror::Error;

use crate::engine::InvalidMove;

/// Failure while handling a single inbound command.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Malformed metadata, unknown sender or out-of-sequence command.
    #[error("protocol violation{}: {reason}", session_suffix(.session))]
    ProtocolViolation {
        session: Option<SessionId>,
        reason: String,
    },

    /// The mover sent a move the match engine rejected.
    #[error("invalid move by {session}: {source}")]
    InvalidMove {
        session: SessionId,
        #[source]
        source: InvalidMove,
    },

    #[error("unrecognized command type {0:?}")]
    UnrecognizedCommand(String),
}

impl HandlerError {
    pub fn violation(session: SessionId, reason: impl Into<String>) -> Self {
        HandlerError::ProtocolViolation {
            session: Some(session),
            reason: reason.into(),
        }
    }

    pub fn anonymous(reason: impl Into<String>) -> Self {
        HandlerError::ProtocolViolation {
            session: None,
            reason: reason.into(),
        }
    }

    /// The session that should be disconnected because of this error, if
    /// any.
    pub fn offender(&self) -> Option<SessionId> {
        match self {
            HandlerError::ProtocolViolation { session, .. } => *session,
            HandlerError::InvalidMove { session, .. } => Some(*session),
            HandlerError::UnrecognizedCommand(_) => None,
        }
    }
}

fn session_suffix(session: &Option<SessionId>) -> String {
    session.map(|id| format!(" by {id}")).unwrap_or_default()
}

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Returned by bridge calls once the dispatcher has shut down.
#[derive(Debug, Error)]
#[error("game server is not running")]
pub struct BridgeClosed;
