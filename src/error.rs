//! Relay error types.
//!
//! Errors never cross the coordinator/agent boundary: a protocol violation is
//! answered with an `invalid_move` message, a full session with a `rejected`
//! notice. `RelayError` covers what stays local to one process.

use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::coordinator::{MoveRejection, SessionError};
use derive_more::{Display, Error};
use strictly_tictactoe::{BoardError, WireError};
use tracing::instrument;

/// Error taxonomy shared by coordinator and agents.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum RelayErrorKind {
    /// Wrong turn, malformed move, occupied cell or out-of-range index.
    #[display("protocol violation: {_0}")]
    ProtocolViolation(String),
    /// A third registration was attempted.
    #[display("session already has two players")]
    SessionFull,
    /// Delivery failure or broker connection loss. Fatal to the session.
    #[display("channel fault: {_0}")]
    ChannelFault(String),
    /// Board-state string of wrong length or alphabet.
    #[display("malformed wire state: {_0}")]
    MalformedWireState(String),
    /// The local move source or board sink failed.
    #[display("surface error: {_0}")]
    Surface(String),
    /// Configuration could not be loaded.
    #[display("configuration error: {_0}")]
    Config(String),
}

/// Relay error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Relay error: {} at {}:{}", kind, file, line)]
pub struct RelayError {
    /// Error kind.
    pub kind: RelayErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl RelayError {
    /// Creates a new relay error with caller location tracking.
    #[track_caller]
    #[instrument]
    pub fn new(kind: RelayErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Shorthand for a [`RelayErrorKind::ChannelFault`].
    #[track_caller]
    pub fn channel_fault(message: impl Into<String>) -> Self {
        Self::new(RelayErrorKind::ChannelFault(message.into()))
    }

    /// Shorthand for a [`RelayErrorKind::Surface`].
    #[track_caller]
    pub fn surface(message: impl Into<String>) -> Self {
        Self::new(RelayErrorKind::Surface(message.into()))
    }

    /// True when the error ends the session.
    pub fn is_channel_fault(&self) -> bool {
        matches!(self.kind, RelayErrorKind::ChannelFault(_))
    }
}

impl From<ChannelError> for RelayError {
    #[track_caller]
    fn from(err: ChannelError) -> Self {
        Self::channel_fault(err.to_string())
    }
}

impl From<WireError> for RelayError {
    #[track_caller]
    fn from(err: WireError) -> Self {
        Self::new(RelayErrorKind::MalformedWireState(err.kind.to_string()))
    }
}

impl From<SessionError> for RelayError {
    #[track_caller]
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionFull => Self::new(RelayErrorKind::SessionFull),
        }
    }
}

impl From<MoveRejection> for RelayError {
    #[track_caller]
    fn from(rejection: MoveRejection) -> Self {
        Self::new(RelayErrorKind::ProtocolViolation(rejection.to_string()))
    }
}

impl From<BoardError> for RelayError {
    #[track_caller]
    fn from(err: BoardError) -> Self {
        Self::new(RelayErrorKind::ProtocolViolation(err.kind.to_string()))
    }
}

impl From<ConfigError> for RelayError {
    #[track_caller]
    fn from(err: ConfigError) -> Self {
        Self::new(RelayErrorKind::Config(err.message))
    }
}
