//! Player agent state machine.

use super::surface::{BoardSink, MoveSource, SinkEvent};
use crate::channel::{MessageChannel, Subscription};
use crate::error::RelayError;
use crate::protocol::{Address, Envelope, Message, PlayerId};
use strictly_tictactoe::{Board, CELL_COUNT, Marker};
use tracing::{debug, info, instrument, warn};

/// Agent lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AgentState {
    /// Registered, waiting for `start`.
    Registering,
    /// Session in progress.
    Active,
    /// Session over; nothing more is processed.
    Closed,
}

/// What the driver loop should do after a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentFlow {
    /// Keep consuming.
    Continue,
    /// Session over with this result (or refusal reason).
    Closed(String),
}

/// Parses local move input: a decimal cell index in 0-8.
pub fn parse_cell(input: &str) -> Option<usize> {
    let digits = input.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok().filter(|cell| *cell < CELL_COUNT)
}

/// Plays one side of a session.
///
/// Owns a read-only projection of the board that is overwritten by every
/// board-state push; the coordinator remains the authority on validity and
/// turn order.
pub struct PlayerAgent<C> {
    channel: C,
    register_at: Address,
    coordinator: Address,
    reply_to: Option<Address>,
    source: Box<dyn MoveSource>,
    sink: Box<dyn BoardSink>,
    state: AgentState,
    player_id: Option<PlayerId>,
    marker: Option<Marker>,
    board: Board,
    awaiting_verdict: bool,
    turns: u32,
}

impl<C: MessageChannel> PlayerAgent<C> {
    /// Creates an agent that registers at `register_at` (the coordinator or
    /// a lobby) and sends moves to `coordinator`.
    pub fn new(
        channel: C,
        register_at: Address,
        coordinator: Address,
        source: Box<dyn MoveSource>,
        sink: Box<dyn BoardSink>,
    ) -> Self {
        Self {
            channel,
            register_at,
            coordinator,
            reply_to: None,
            source,
            sink,
            state: AgentState::Registering,
            player_id: None,
            marker: None,
            board: Board::new(),
            awaiting_verdict: false,
            turns: 0,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Local board projection.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Marker assigned at start.
    pub fn marker(&self) -> Option<Marker> {
        self.marker
    }

    /// Identifier assigned at start.
    pub fn player_id(&self) -> Option<&str> {
        self.player_id.as_deref()
    }

    /// Number of `turn` prompts received. Retries after `invalid_move` do not
    /// count.
    pub fn turns(&self) -> u32 {
        self.turns
    }

    /// Reply address, once registered.
    pub fn reply_to(&self) -> Option<&Address> {
        self.reply_to.as_ref()
    }

    /// Declares an exclusive reply address, subscribes to it and sends
    /// `register`.
    #[instrument(skip(self), fields(register_at = %self.register_at))]
    pub async fn register(&mut self) -> Result<Subscription, RelayError> {
        let reply_to = self.channel.declare_exclusive().await?;
        self.channel.declare(&self.register_at).await?;
        self.channel.declare(&self.coordinator).await?;
        let subscription = self.channel.subscribe(&reply_to).await?;

        self.channel
            .publish(
                &self.register_at,
                Envelope::new(Message::Register(reply_to.clone())),
            )
            .await?;
        info!(%reply_to, "Registration sent, waiting for game to start");
        self.reply_to = Some(reply_to);
        Ok(subscription)
    }

    /// Reacts to one notice from the coordinator.
    ///
    /// # Errors
    ///
    /// Channel faults while sending a move, or a failing move source.
    /// Malformed board states are discarded, not reported.
    #[instrument(
        skip(self, envelope),
        fields(kind = envelope.message.kind(), state = %self.state)
    )]
    pub async fn handle(&mut self, envelope: Envelope) -> Result<AgentFlow, RelayError> {
        if self.state == AgentState::Closed {
            debug!("Agent closed, ignoring message");
            return Ok(AgentFlow::Closed(String::new()));
        }

        match envelope.message {
            Message::Start { player_id, marker } => {
                info!(%player_id, %marker, "Game started");
                self.state = AgentState::Active;
                self.sink.render(SinkEvent::Started {
                    player_id: &player_id,
                    marker,
                });
                self.sink.render(SinkEvent::Board(&self.board));
                self.player_id = Some(player_id);
                self.marker = Some(marker);
            }
            Message::Turn => {
                if self.state != AgentState::Active {
                    warn!("Turn prompt before start, ignoring");
                    return Ok(AgentFlow::Continue);
                }
                self.turns += 1;
                self.play_turn().await?;
            }
            Message::BoardState(wire) => self.apply_board_state(&wire),
            Message::InvalidMove => {
                if self.awaiting_verdict {
                    info!("Move rejected, asking again");
                    self.sink.render(SinkEvent::Rejected);
                    self.play_turn().await?;
                } else {
                    debug!("Stale invalid_move with no move outstanding, ignoring");
                }
            }
            Message::End(result) => {
                info!(%result, "Game over");
                self.state = AgentState::Closed;
                self.awaiting_verdict = false;
                self.sink.render(SinkEvent::Finished(&result));
                return Ok(AgentFlow::Closed(result));
            }
            Message::Rejected(reason) => {
                warn!(%reason, "Registration refused");
                self.state = AgentState::Closed;
                self.sink.render(SinkEvent::Refused(&reason));
                return Ok(AgentFlow::Closed(reason));
            }
            other @ (Message::Register(_) | Message::Move(_)) => {
                warn!(kind = other.kind(), "Unexpected message on reply address");
            }
        }
        Ok(AgentFlow::Continue)
    }

    /// Overwrites the local board. Identical pushes are a no-op, malformed
    /// ones are dropped.
    fn apply_board_state(&mut self, wire: &str) {
        let board = match Board::from_wire_string(wire).map_err(RelayError::from) {
            Ok(board) => board,
            Err(err) => {
                warn!(error = %err, "Discarding malformed board state");
                return;
            }
        };
        self.awaiting_verdict = false;
        if board == self.board {
            debug!("Board state unchanged");
            return;
        }
        self.board = board;
        self.sink.render(SinkEvent::Board(&self.board));
    }

    /// Asks the move source until it produces a well-formed index, then sends
    /// it to the coordinator.
    async fn play_turn(&mut self) -> Result<(), RelayError> {
        let cell = loop {
            let input = self
                .source
                .request_move(&self.board)
                .await
                .map_err(|e| RelayError::surface(e.to_string()))?;
            match parse_cell(&input) {
                Some(cell) => break cell,
                None => {
                    debug!(input = %input, "Input is not a cell index 0-8");
                    self.sink.render(SinkEvent::BadInput(&input));
                }
            }
        };

        let player_id = self.player_id.clone().unwrap_or_default();
        self.channel
            .publish(
                &self.coordinator,
                Envelope::from_player(player_id, Message::move_to(cell)),
            )
            .await?;
        self.awaiting_verdict = true;
        debug!(cell, "Move sent");
        Ok(())
    }

    /// Releases the reply address.
    #[instrument(skip(self))]
    pub async fn release(&mut self) -> Result<(), RelayError> {
        if let Some(reply_to) = self.reply_to.take() {
            let discarded = self.channel.delete(&reply_to).await?;
            debug!(%reply_to, discarded, "Reply address released");
        }
        Ok(())
    }

    /// Registers, plays until the session ends, then releases the reply
    /// address. Returns the result string.
    ///
    /// # Errors
    ///
    /// Losing the subscription before `end` is a channel fault.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<String, RelayError> {
        let mut subscription = self.register().await?;

        while let Some(delivery) = subscription.next().await {
            let flow = self.handle(delivery.envelope).await?;
            subscription.ack(delivery.tag).await?;

            if let AgentFlow::Closed(result) = flow {
                drop(subscription);
                self.release().await?;
                return Ok(result);
            }
        }

        Err(RelayError::channel_fault(
            "reply subscription closed before the session ended",
        ))
    }
}
