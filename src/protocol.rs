//! Message vocabulary exchanged between coordinator and player agents.
//!
//! Payloads are plain text. On the broker wire an envelope is JSON:
//! `{"player_id": "player1", "message": {"kind": "move", "payload": "4"}}`.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use strictly_tictactoe::{Board, Marker};

/// Unique identifier of a registered player.
pub type PlayerId = String;

/// A named delivery endpoint on the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Creates an address from a queue name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The queue name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Address {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Message {
    /// Agent → coordinator: join the session, answers go to this address.
    Register(Address),
    /// Coordinator → both agents: the session is in progress.
    Start {
        /// Identifier the agent must put in the `Player-Id` header.
        player_id: PlayerId,
        /// Marker assigned by slot order.
        marker: Marker,
    },
    /// Coordinator → current agent: your move.
    Turn,
    /// Agent → coordinator: decimal cell index, unparsed.
    Move(String),
    /// Coordinator → both agents: 9-character board string.
    BoardState(String),
    /// Coordinator → offending agent: move refused, try again.
    InvalidMove,
    /// Coordinator → both agents: "<playerId> wins" or "draw".
    End(String),
    /// Coordinator → registrant: registration refused.
    Rejected(String),
}

impl Message {
    /// Message kind as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Move message for a cell index.
    pub fn move_to(cell: usize) -> Self {
        Message::Move(cell.to_string())
    }

    /// Board-state message for `board`.
    pub fn board_state(board: &Board) -> Self {
        Message::BoardState(board.to_wire_string())
    }
}

/// A message plus its headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// `Player-Id` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    /// Message body.
    pub message: Message,
}

impl Envelope {
    /// Envelope without headers.
    pub fn new(message: Message) -> Self {
        Self {
            player_id: None,
            message,
        }
    }

    /// Envelope carrying the sender's `Player-Id` header.
    pub fn from_player(player_id: impl Into<PlayerId>, message: Message) -> Self {
        Self {
            player_id: Some(player_id.into()),
            message,
        }
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}

/// Final result of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum GameResult {
    /// A player completed a winning triple.
    #[display("{_0} wins")]
    Winner(PlayerId),
    /// Board full, no winner.
    #[display("draw")]
    Draw,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_strings() {
        assert_eq!(GameResult::Winner("player1".into()).to_string(), "player1 wins");
        assert_eq!(GameResult::Draw.to_string(), "draw");
    }

    #[test]
    fn test_wire_shape_of_move() {
        let envelope = Envelope::from_player("player2", Message::move_to(4));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "player_id": "player2",
                "message": { "kind": "move", "payload": "4" }
            })
        );
    }

    #[test]
    fn test_unit_messages_have_no_payload() {
        let json = serde_json::to_value(Envelope::new(Message::InvalidMove)).unwrap();
        assert_eq!(json, serde_json::json!({ "message": { "kind": "invalid_move" } }));
        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(back.message, Message::InvalidMove);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Message::Turn.kind(), "turn");
        assert_eq!(Message::BoardState(String::new()).kind(), "board_state");
        assert_eq!(Message::Register(Address::new("q")).kind(), "register");
    }
}
