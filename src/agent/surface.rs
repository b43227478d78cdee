//! Capabilities the agent needs from a user-facing surface.
//!
//! The agent logic depends only on these traits. Each surface (console
//! prompt, keypad, automatic player) provides its own adapter.

use anyhow::Result;
use strictly_tictactoe::{Board, Marker};

/// Produces candidate moves.
#[async_trait::async_trait]
pub trait MoveSource: Send {
    /// Asks for a cell index as raw text.
    ///
    /// May suspend indefinitely while waiting on a human. The agent
    /// validates the format and asks again if needed.
    async fn request_move(&mut self, board: &Board) -> Result<String>;
}

/// What the agent shows to its user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent<'a> {
    /// Session started with this identity.
    Started {
        /// Assigned identifier.
        player_id: &'a str,
        /// Assigned marker.
        marker: Marker,
    },
    /// Authoritative board pushed by the coordinator.
    Board(&'a Board),
    /// Local input was not a cell index 0-8.
    BadInput(&'a str),
    /// The coordinator refused the last move.
    Rejected,
    /// Session ended with this result.
    Finished(&'a str),
    /// Registration refused.
    Refused(&'a str),
}

/// Renders board state and results.
pub trait BoardSink: Send {
    /// Shows one event.
    fn render(&mut self, event: SinkEvent<'_>);
}
