//! Coordinator service.
//!
//! Consumes the coordinator address one delivery at a time. The single
//! consumer per address is the only thing serializing access to the
//! [`Session`]; there is no lock.

use super::session::{Session, SessionStatus};
use crate::channel::{MessageChannel, Subscription};
use crate::error::RelayError;
use crate::protocol::{Address, GameResult};
use derive_getters::Getters;
use strictly_tictactoe::Board;
use tracing::{debug, info, instrument, warn};

/// How a finished session ended.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct SessionOutcome {
    /// Winner or draw.
    result: GameResult,
    /// Final board.
    board: Board,
    /// Late messages discarded while releasing the coordinator address.
    discarded: usize,
}

/// Owns one session and drives it from the coordinator address.
pub struct Coordinator<C> {
    channel: C,
    address: Address,
    session: Session,
}

impl<C: MessageChannel> Coordinator<C> {
    /// Creates a coordinator for a fresh session.
    pub fn new(channel: C, address: Address) -> Self {
        Self {
            channel,
            address,
            session: Session::new(),
        }
    }

    /// Read-only view of the session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs the session to completion.
    ///
    /// Each delivery is handled, its outgoing messages published, and only
    /// then acked. Once the session finishes the shutdown sequence runs
    /// exactly once before this returns.
    ///
    /// # Errors
    ///
    /// A channel fault (failed publish, lost subscription) ends the session
    /// with an error; nothing is resumed or replayed.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn run(mut self) -> Result<SessionOutcome, RelayError> {
        self.channel.declare(&self.address).await?;
        let mut subscription = self.channel.subscribe(&self.address).await?;
        info!("Coordinator ready, waiting for players");

        while let Some(delivery) = subscription.next().await {
            if delivery.redelivered {
                debug!(tag = delivery.tag, "Handling redelivered message");
            }

            for out in self.session.handle(delivery.envelope) {
                debug!(to = %out.to, kind = out.envelope.message.kind(), "Publishing");
                self.channel.publish(&out.to, out.envelope).await?;
            }
            subscription.ack(delivery.tag).await?;

            if *self.session.status() == SessionStatus::Finished {
                return self.shutdown(subscription).await;
            }
        }

        warn!(status = %self.session.status(), "Coordinator address closed mid-session");
        Err(RelayError::channel_fault(
            "coordinator subscription closed before the session finished",
        ))
    }

    /// Stops consuming and purges the coordinator address so that moves
    /// arriving after the end are discarded rather than processed.
    #[instrument(skip_all)]
    async fn shutdown(self, subscription: Subscription) -> Result<SessionOutcome, RelayError> {
        drop(subscription);
        let discarded = self.channel.delete(&self.address).await?;
        if discarded > 0 {
            info!(discarded, "Discarded messages received after the session ended");
        }

        let result = self
            .session
            .result()
            .clone()
            .ok_or_else(|| RelayError::channel_fault("finished session without a result"))?;
        info!(%result, "Session closed");
        Ok(SessionOutcome {
            result,
            board: self.session.board().clone(),
            discarded,
        })
    }
}
