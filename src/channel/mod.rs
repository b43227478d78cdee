//! Message channel contract.
//!
//! Delivery guarantees required by the coordinator and the agents:
//! at-least-once, FIFO per address, one active consumer per address and one
//! unacknowledged delivery in flight per consumer (prefetch one). Until a
//! delivery is acked, [`Consumer::next`] hands the same delivery back with
//! `redelivered` set; dropping a consumer requeues its in-flight delivery at
//! the front of the address.

mod memory;
pub mod tcp;

pub use memory::MemoryBroker;

use crate::protocol::{Address, Envelope};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

/// Per-consumer delivery sequence number.
pub type DeliveryTag = u64;

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Tag to acknowledge.
    pub tag: DeliveryTag,
    /// True when this delivery was handed out before without an ack.
    pub redelivered: bool,
    /// The message.
    pub envelope: Envelope,
}

/// Broker-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error, Serialize, Deserialize)]
pub enum ChannelError {
    /// Publish or subscribe to an address that was never declared.
    #[display("no such address: {address}")]
    UnknownAddress {
        /// The address.
        address: Address,
    },
    /// A second consumer tried to attach to an address.
    #[display("address {address} already has an active consumer")]
    ConsumerExists {
        /// The address.
        address: Address,
    },
    /// Ack for a tag that is not in flight.
    #[display("delivery {tag} is not in flight")]
    UnknownDelivery {
        /// The tag.
        tag: DeliveryTag,
    },
    /// The broker connection is gone.
    #[display("broker connection lost")]
    Disconnected,
    /// Transport failure.
    #[display("broker I/O error: {message}")]
    Io {
        /// Error text.
        message: String,
    },
}

impl ChannelError {
    pub(crate) fn io(err: impl std::fmt::Display) -> Self {
        ChannelError::Io {
            message: err.to_string(),
        }
    }
}

/// The consuming end of an address.
#[async_trait::async_trait]
pub trait Consumer: Send {
    /// Address this consumer is attached to.
    fn address(&self) -> &Address;

    /// Waits for the next delivery; `None` once the address is deleted or the
    /// broker connection is lost.
    async fn next(&mut self) -> Option<Delivery>;

    /// Acknowledges the in-flight delivery.
    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), ChannelError>;
}

/// An attached consumer. Dropping it releases the address.
pub type Subscription = Box<dyn Consumer>;

/// Addressed, ordered, at-least-once message delivery.
#[async_trait::async_trait]
pub trait MessageChannel: Send + Sync {
    /// Creates the address if it does not exist yet.
    async fn declare(&self, address: &Address) -> Result<(), ChannelError>;

    /// Creates a fresh, uniquely named reply address.
    async fn declare_exclusive(&self) -> Result<Address, ChannelError>;

    /// Appends an envelope to an address.
    async fn publish(&self, address: &Address, envelope: Envelope) -> Result<(), ChannelError>;

    /// Attaches the single consumer of an address.
    async fn subscribe(&self, address: &Address) -> Result<Subscription, ChannelError>;

    /// Removes an address, returning how many queued messages were discarded.
    /// Deleting an unknown address is a no-op.
    async fn delete(&self, address: &Address) -> Result<usize, ChannelError>;
}
