//! Registration lobby.

use crate::channel::MessageChannel;
use crate::error::RelayError;
use crate::protocol::{Address, Envelope, Message};
use tracing::{info, instrument, warn};

/// Intermediate address that forwards registrations to a coordinator.
///
/// Agents that only know the lobby address register there; every `register`
/// is republished unchanged on the coordinator address. Anything else is
/// dropped.
pub struct Lobby<C> {
    channel: C,
    address: Address,
    coordinator: Address,
}

impl<C: MessageChannel> Lobby<C> {
    /// Creates a lobby forwarding to `coordinator`.
    pub fn new(channel: C, address: Address, coordinator: Address) -> Self {
        Self {
            channel,
            address,
            coordinator,
        }
    }

    /// Forwards until the lobby address is deleted or the broker goes away.
    /// Returns the number of registrations forwarded.
    #[instrument(skip(self), fields(address = %self.address, coordinator = %self.coordinator))]
    pub async fn run(self) -> Result<usize, RelayError> {
        self.channel.declare(&self.address).await?;
        self.channel.declare(&self.coordinator).await?;
        let mut subscription = self.channel.subscribe(&self.address).await?;
        info!("Lobby open");

        let mut forwarded = 0;
        while let Some(delivery) = subscription.next().await {
            match &delivery.envelope.message {
                Message::Register(reply_to) => {
                    info!(%reply_to, "Forwarding registration");
                    self.channel
                        .publish(
                            &self.coordinator,
                            Envelope::new(Message::Register(reply_to.clone())),
                        )
                        .await?;
                    forwarded += 1;
                }
                other => warn!(kind = other.kind(), "Lobby only accepts registrations"),
            }
            subscription.ack(delivery.tag).await?;
        }

        info!(forwarded, "Lobby closed");
        Ok(forwarded)
    }
}
