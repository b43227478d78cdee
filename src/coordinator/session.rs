//! Session state machine.
//!
//! A [`Session`] is an owned value mutated only through [`Session::handle`]
//! (or the two transitions it dispatches to). Every transition returns the
//! messages to publish, so the whole protocol can be exercised without a
//! broker.

use crate::error::RelayError;
use crate::protocol::{Address, Envelope, GameResult, Message, PlayerId};
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_new::new;
use strictly_tictactoe::{Board, Marker};
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a session. No cycles, no reverse edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum SessionStatus {
    /// Fewer than two players registered.
    #[default]
    Waiting,
    /// Both slots filled; moves accepted.
    InProgress,
    /// Won or drawn. Terminal.
    Finished,
}

/// A registered player.
#[derive(Debug, Clone, PartialEq, Eq, Getters, new)]
pub struct PlayerSlot {
    /// Identifier carried in the `Player-Id` header.
    player_id: PlayerId,
    /// Where this player's notices go.
    reply_to: Address,
    /// Marker fixed at registration.
    marker: Marker,
}

/// A message to publish.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Outgoing {
    /// Destination address.
    pub to: Address,
    /// The message.
    pub envelope: Envelope,
}

/// Successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Assigned identifier.
    pub player_id: PlayerId,
    /// Assigned marker.
    pub marker: Marker,
    /// Messages triggered by the registration.
    pub outgoing: Vec<Outgoing>,
}

/// Registration refused.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum SessionError {
    /// Both slots are taken.
    #[display("session_full")]
    SessionFull,
}

/// Why a move was refused. Always answered with `invalid_move`.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum MoveRejection {
    /// Session is waiting for players or already finished.
    #[display("session is {_0}")]
    NotActive(SessionStatus),
    /// Sender is not the player whose turn it is.
    #[display("not {_0}'s turn")]
    NotYourTurn(PlayerId),
    /// Payload is not a decimal cell index.
    #[display("malformed move payload {_0:?}")]
    Malformed(String),
    /// Index out of range or cell already marked.
    #[display("cell {_0} is not available")]
    Unavailable(usize),
}

/// One game between two slots.
#[derive(Debug, Clone, Default, Getters)]
pub struct Session {
    /// Authoritative board.
    board: Board,
    /// Registered players in slot order (at most two).
    slots: Vec<PlayerSlot>,
    /// Index of the slot allowed to move.
    current_turn: usize,
    /// Lifecycle status.
    status: SessionStatus,
    /// Set once, on the Finished transition.
    result: Option<GameResult>,
}

impl Session {
    /// Creates a waiting session with no slots.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating new session");
        Self::default()
    }

    /// Slot whose turn it is, once the session has started.
    pub fn current_player(&self) -> Option<&PlayerSlot> {
        match self.status {
            SessionStatus::InProgress => self.slots.get(self.current_turn),
            _ => None,
        }
    }

    /// Slot registered under `player_id`.
    pub fn slot(&self, player_id: &str) -> Option<&PlayerSlot> {
        self.slots.iter().find(|s| s.player_id == player_id)
    }

    /// Dispatches one inbound message.
    ///
    /// Messages that are not meant for the coordinator, and moves without a
    /// known `Player-Id`, are logged and dropped.
    #[instrument(
        skip(self, envelope),
        fields(kind = envelope.message.kind(), player_id = ?envelope.player_id)
    )]
    pub fn handle(&mut self, envelope: Envelope) -> Vec<Outgoing> {
        match envelope.message {
            Message::Register(reply_to) => match self.register(reply_to.clone()) {
                Ok(registration) => registration.outgoing,
                Err(e) => {
                    let reason = e.to_string();
                    let err = RelayError::from(e);
                    info!(error = %err, %reply_to, "Refusing registration");
                    vec![Outgoing::new(
                        reply_to,
                        Envelope::new(Message::Rejected(reason)),
                    )]
                }
            },
            Message::Move(cell) => match envelope.player_id {
                Some(player_id) => self.process_move(&player_id, &cell),
                None => {
                    warn!(cell = %cell, "Move without Player-Id header, discarding");
                    Vec::new()
                }
            },
            other => {
                warn!(kind = other.kind(), "Unexpected message on coordinator address");
                Vec::new()
            }
        }
    }

    /// Assigns the next free slot to `reply_to`.
    ///
    /// The first registrant gets X, the second O. Filling the second slot
    /// starts the session: both players receive `start` and slot 0 receives
    /// the first `turn`. A repeated registration from an address that already
    /// holds a slot returns that slot and sends nothing.
    ///
    /// # Errors
    ///
    /// [`SessionError::SessionFull`] when both slots are taken; existing slots
    /// are left untouched.
    #[instrument(skip(self))]
    pub fn register(&mut self, reply_to: Address) -> Result<Registration, SessionError> {
        if let Some(existing) = self.slots.iter().find(|s| s.reply_to == reply_to) {
            debug!(player_id = %existing.player_id, "Duplicate registration, ignoring");
            return Ok(Registration {
                player_id: existing.player_id.clone(),
                marker: existing.marker,
                outgoing: Vec::new(),
            });
        }

        if self.slots.len() >= 2 || self.status != SessionStatus::Waiting {
            warn!("Session already has 2 players");
            return Err(SessionError::SessionFull);
        }

        let index = self.slots.len();
        let slot = PlayerSlot::new(
            format!("player{}", index + 1),
            reply_to,
            Marker::for_slot(index),
        );
        info!(player_id = %slot.player_id, marker = %slot.marker, "Registered player");
        self.slots.push(slot.clone());

        let mut outgoing = Vec::new();
        if self.slots.len() == 2 {
            self.status = SessionStatus::InProgress;
            self.current_turn = 0;
            info!("Both slots filled, session in progress");
            for s in &self.slots {
                outgoing.push(Outgoing::new(
                    s.reply_to.clone(),
                    Envelope::new(Message::Start {
                        player_id: s.player_id.clone(),
                        marker: s.marker,
                    }),
                ));
            }
            outgoing.push(self.prompt_current());
        }

        Ok(Registration {
            player_id: slot.player_id,
            marker: slot.marker,
            outgoing,
        })
    }

    /// Validates and applies one move.
    ///
    /// Rejections reply `invalid_move` to the sender only and leave the
    /// board and turn untouched. An accepted move either finishes the
    /// session (board-state then `end` to both) or hands the turn over
    /// (board-state to both, `turn` to the next player).
    #[instrument(skip(self))]
    pub fn process_move(&mut self, player_id: &str, cell: &str) -> Vec<Outgoing> {
        let Some(sender) = self.slot(player_id).cloned() else {
            warn!("Move from unknown player, discarding");
            return Vec::new();
        };

        match self.validate_move(player_id, cell) {
            Ok(index) => self.accept(index),
            Err(err) => {
                info!(error = %err, "Rejecting move");
                vec![Outgoing::new(
                    sender.reply_to,
                    Envelope::new(Message::InvalidMove),
                )]
            }
        }
    }

    /// Checks a move against turn order and the board without applying it.
    ///
    /// # Errors
    ///
    /// [`crate::RelayErrorKind::ProtocolViolation`] naming the
    /// [`MoveRejection`].
    pub fn validate_move(&self, player_id: &str, cell: &str) -> Result<usize, RelayError> {
        Ok(self.check_move(player_id, cell)?)
    }

    fn check_move(&self, player_id: &str, cell: &str) -> Result<usize, MoveRejection> {
        if self.status != SessionStatus::InProgress {
            return Err(MoveRejection::NotActive(self.status));
        }
        let current = &self.slots[self.current_turn];
        if current.player_id != player_id {
            return Err(MoveRejection::NotYourTurn(player_id.to_string()));
        }
        let digits = cell.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MoveRejection::Malformed(cell.to_string()));
        }
        let index: usize = digits
            .parse()
            .map_err(|_| MoveRejection::Malformed(cell.to_string()))?;
        if !self.board.is_valid_move(index) {
            return Err(MoveRejection::Unavailable(index));
        }
        Ok(index)
    }

    fn accept(&mut self, index: usize) -> Vec<Outgoing> {
        let mover = self.slots[self.current_turn].clone();
        if let Err(e) = self.board.apply(index, mover.marker) {
            let err = RelayError::from(e);
            warn!(error = %err, "Validated move failed to apply");
            return vec![Outgoing::new(
                mover.reply_to,
                Envelope::new(Message::InvalidMove),
            )];
        }
        info!(player_id = %mover.player_id, cell = index, "Move accepted");

        let mut outgoing = self.broadcast(Message::board_state(&self.board));

        if self.board.winner().is_some() {
            outgoing.extend(self.finish(GameResult::Winner(mover.player_id)));
        } else if self.board.is_draw() {
            outgoing.extend(self.finish(GameResult::Draw));
        } else {
            self.current_turn = 1 - self.current_turn;
            outgoing.push(self.prompt_current());
        }
        outgoing
    }

    fn finish(&mut self, result: GameResult) -> Vec<Outgoing> {
        info!(%result, "Session finished");
        self.status = SessionStatus::Finished;
        let outgoing = self.broadcast(Message::End(result.to_string()));
        self.result = Some(result);
        outgoing
    }

    fn prompt_current(&self) -> Outgoing {
        let current = &self.slots[self.current_turn];
        debug!(player_id = %current.player_id, "Prompting for move");
        Outgoing::new(current.reply_to.clone(), Envelope::new(Message::Turn))
    }

    fn broadcast(&self, message: Message) -> Vec<Outgoing> {
        self.slots
            .iter()
            .map(|s| Outgoing::new(s.reply_to.clone(), Envelope::new(message.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> Session {
        let mut session = Session::new();
        session.register(Address::new("a")).unwrap();
        session.register(Address::new("b")).unwrap();
        session
    }

    #[test]
    fn test_first_registration_waits() {
        let mut session = Session::new();
        let registration = session.register(Address::new("a")).unwrap();
        assert_eq!(registration.player_id, "player1");
        assert_eq!(registration.marker, Marker::X);
        assert!(registration.outgoing.is_empty());
        assert_eq!(session.status(), &SessionStatus::Waiting);
    }

    #[test]
    fn test_second_registration_starts_session() {
        let mut session = Session::new();
        session.register(Address::new("a")).unwrap();
        let registration = session.register(Address::new("b")).unwrap();
        assert_eq!(registration.marker, Marker::O);
        assert_eq!(session.status(), &SessionStatus::InProgress);

        let to: Vec<_> = registration.outgoing.iter().map(|o| o.to.as_str()).collect();
        assert_eq!(to, ["a", "b", "a"]);
        assert_eq!(registration.outgoing[2].envelope.message, Message::Turn);
    }

    #[test]
    fn test_malformed_move_rejected() {
        let mut session = started();
        let out = session.process_move("player1", "four");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Address::new("a"));
        assert_eq!(out[0].envelope.message, Message::InvalidMove);
        assert_eq!(session.board(), &Board::new());
    }

    #[test]
    fn test_out_of_range_move_rejected() {
        let mut session = started();
        let out = session.process_move("player1", "9");
        assert_eq!(out[0].envelope.message, Message::InvalidMove);
        assert_eq!(session.current_turn(), &0);
    }

    #[test]
    fn test_move_before_start_rejected() {
        let mut session = Session::new();
        session.register(Address::new("a")).unwrap();
        let out = session.process_move("player1", "0");
        assert_eq!(
            out,
            vec![Outgoing::new(
                Address::new("a"),
                Envelope::new(Message::InvalidMove)
            )]
        );
        assert_eq!(session.board(), &Board::new());
    }

    #[test]
    fn test_signed_move_is_malformed() {
        let mut session = started();
        for payload in ["+4", "-0", " +4 ", ""] {
            let out = session.process_move("player1", payload);
            assert_eq!(out[0].envelope.message, Message::InvalidMove, "{payload:?}");
        }
        assert_eq!(session.board(), &Board::new());
        assert_eq!(session.validate_move("player1", " 4 ").unwrap(), 4);
    }

    #[test]
    fn test_rejections_are_protocol_violations() {
        use crate::error::RelayErrorKind;

        let session = started();
        for (player, cell) in [("player2", "0"), ("player1", "four"), ("player1", "9")] {
            let err = session.validate_move(player, cell).unwrap_err();
            assert!(
                matches!(err.kind, RelayErrorKind::ProtocolViolation(_)),
                "{player} {cell}: {err}"
            );
        }
    }

    #[test]
    fn test_unknown_player_is_discarded() {
        let mut session = started();
        assert!(session.process_move("player3", "0").is_empty());
    }

    #[test]
    fn test_move_without_header_is_discarded() {
        let mut session = started();
        assert!(session.handle(Envelope::new(Message::move_to(0))).is_empty());
        assert_eq!(session.board(), &Board::new());
    }

    #[test]
    fn test_third_registration_gets_rejected_notice() {
        let mut session = started();
        let out = session.handle(Envelope::new(Message::Register(Address::new("c"))));
        assert_eq!(
            out,
            vec![Outgoing::new(
                Address::new("c"),
                Envelope::new(Message::Rejected("session_full".into()))
            )]
        );
    }

    #[test]
    fn test_current_player_only_while_in_progress() {
        let mut session = Session::new();
        assert!(session.current_player().is_none());
        session.register(Address::new("a")).unwrap();
        session.register(Address::new("b")).unwrap();
        assert_eq!(session.current_player().unwrap().player_id(), "player1");
    }
}
