//! In-process broker.

use super::{ChannelError, Consumer, Delivery, DeliveryTag, MessageChannel, Subscription};
use crate::protocol::{Address, Envelope};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, instrument, trace};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<Envelope>,
    consumer_attached: bool,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Queue {
    state: Mutex<QueueState>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct Registry {
    queues: HashMap<Address, Arc<Queue>>,
    next_exclusive: u64,
}

/// Broker holding every address in memory.
///
/// Cloning shares the same queues. Used directly by tests and `local` mode,
/// and exposed over TCP by [`super::tcp::BrokerServer`].
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, address: &Address) -> Result<Arc<Queue>, ChannelError> {
        lock(&self.registry)
            .queues
            .get(address)
            .cloned()
            .ok_or_else(|| ChannelError::UnknownAddress {
                address: address.clone(),
            })
    }

    /// Number of messages waiting on an address (excluding one in flight).
    pub fn depth(&self, address: &Address) -> Option<usize> {
        let queue = self.queue(address).ok()?;
        let depth = lock(&queue.state).messages.len();
        Some(depth)
    }
}

#[async_trait::async_trait]
impl MessageChannel for MemoryBroker {
    #[instrument(skip(self))]
    async fn declare(&self, address: &Address) -> Result<(), ChannelError> {
        lock(&self.registry)
            .queues
            .entry(address.clone())
            .or_default();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn declare_exclusive(&self) -> Result<Address, ChannelError> {
        let mut registry = lock(&self.registry);
        registry.next_exclusive += 1;
        let address = Address::new(format!("reply.{}", registry.next_exclusive));
        registry.queues.insert(address.clone(), Arc::default());
        debug!(%address, "Declared exclusive address");
        Ok(address)
    }

    #[instrument(skip(self, envelope), fields(kind = envelope.message.kind()))]
    async fn publish(&self, address: &Address, envelope: Envelope) -> Result<(), ChannelError> {
        let queue = self.queue(address)?;
        {
            let mut state = lock(&queue.state);
            if state.deleted {
                return Err(ChannelError::UnknownAddress {
                    address: address.clone(),
                });
            }
            state.messages.push_back(envelope);
            trace!(depth = state.messages.len(), "Enqueued");
        }
        queue.notify.notify_one();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn subscribe(&self, address: &Address) -> Result<Subscription, ChannelError> {
        let queue = self.queue(address)?;
        {
            let mut state = lock(&queue.state);
            if state.consumer_attached {
                return Err(ChannelError::ConsumerExists {
                    address: address.clone(),
                });
            }
            state.consumer_attached = true;
        }
        debug!("Consumer attached");
        Ok(Box::new(MemoryConsumer {
            address: address.clone(),
            queue,
            next_tag: 0,
            in_flight: None,
        }))
    }

    #[instrument(skip(self))]
    async fn delete(&self, address: &Address) -> Result<usize, ChannelError> {
        let Some(queue) = lock(&self.registry).queues.remove(address) else {
            return Ok(0);
        };
        let purged = {
            let mut state = lock(&queue.state);
            state.deleted = true;
            let purged = state.messages.len();
            state.messages.clear();
            purged
        };
        queue.notify.notify_one();
        debug!(purged, "Address deleted");
        Ok(purged)
    }
}

struct MemoryConsumer {
    address: Address,
    queue: Arc<Queue>,
    next_tag: DeliveryTag,
    in_flight: Option<Delivery>,
}

#[async_trait::async_trait]
impl Consumer for MemoryConsumer {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn next(&mut self) -> Option<Delivery> {
        if let Some(delivery) = self.in_flight.as_mut() {
            delivery.redelivered = true;
            return Some(delivery.clone());
        }

        loop {
            {
                let mut state = lock(&self.queue.state);
                if state.deleted {
                    return None;
                }
                if let Some(envelope) = state.messages.pop_front() {
                    self.next_tag += 1;
                    let delivery = Delivery {
                        tag: self.next_tag,
                        redelivered: false,
                        envelope,
                    };
                    self.in_flight = Some(delivery.clone());
                    return Some(delivery);
                }
            }
            self.queue.notify.notified().await;
        }
    }

    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), ChannelError> {
        match &self.in_flight {
            Some(delivery) if delivery.tag == tag => {
                self.in_flight = None;
                Ok(())
            }
            _ => Err(ChannelError::UnknownDelivery { tag }),
        }
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        let requeued = {
            let mut state = lock(&self.queue.state);
            state.consumer_attached = false;
            match self.in_flight.take() {
                Some(delivery) if !state.deleted => {
                    state.messages.push_front(delivery.envelope);
                    true
                }
                _ => false,
            }
        };
        if requeued {
            self.queue.notify.notify_one();
        }
        debug!(address = %self.address, requeued, "Consumer released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;

    fn addr(name: &str) -> Address {
        Address::new(name)
    }

    #[tokio::test]
    async fn test_fifo_per_address() {
        let broker = MemoryBroker::new();
        broker.declare(&addr("q")).await.unwrap();
        for cell in 0..3 {
            broker
                .publish(&addr("q"), Message::move_to(cell).into())
                .await
                .unwrap();
        }

        let mut consumer = broker.subscribe(&addr("q")).await.unwrap();
        for cell in 0..3 {
            let delivery = consumer.next().await.unwrap();
            assert_eq!(delivery.envelope.message, Message::move_to(cell));
            consumer.ack(delivery.tag).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_publish_to_unknown_address_fails() {
        let broker = MemoryBroker::new();
        let err = broker
            .publish(&addr("missing"), Message::Turn.into())
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownAddress { .. }));
    }

    #[tokio::test]
    async fn test_single_consumer_per_address() {
        let broker = MemoryBroker::new();
        broker.declare(&addr("q")).await.unwrap();
        let first = broker.subscribe(&addr("q")).await.unwrap();
        let err = broker.subscribe(&addr("q")).await.err().unwrap();
        assert!(matches!(err, ChannelError::ConsumerExists { .. }));

        drop(first);
        assert!(broker.subscribe(&addr("q")).await.is_ok());
    }

    #[tokio::test]
    async fn test_unacked_delivery_is_redelivered() {
        let broker = MemoryBroker::new();
        broker.declare(&addr("q")).await.unwrap();
        broker.publish(&addr("q"), Message::Turn.into()).await.unwrap();
        broker
            .publish(&addr("q"), Message::InvalidMove.into())
            .await
            .unwrap();

        let mut consumer = broker.subscribe(&addr("q")).await.unwrap();
        let first = consumer.next().await.unwrap();
        assert!(!first.redelivered);
        let again = consumer.next().await.unwrap();
        assert!(again.redelivered);
        assert_eq!(again.tag, first.tag);
        assert_eq!(again.envelope.message, Message::Turn);

        consumer.ack(first.tag).await.unwrap();
        let second = consumer.next().await.unwrap();
        assert_eq!(second.envelope.message, Message::InvalidMove);
    }

    #[tokio::test]
    async fn test_dropped_consumer_requeues_in_flight() {
        let broker = MemoryBroker::new();
        broker.declare(&addr("q")).await.unwrap();
        broker.publish(&addr("q"), Message::Turn.into()).await.unwrap();

        let mut consumer = broker.subscribe(&addr("q")).await.unwrap();
        let _ = consumer.next().await.unwrap();
        drop(consumer);
        assert_eq!(broker.depth(&addr("q")), Some(1));

        let mut consumer = broker.subscribe(&addr("q")).await.unwrap();
        let delivery = consumer.next().await.unwrap();
        assert_eq!(delivery.envelope.message, Message::Turn);
    }

    #[tokio::test]
    async fn test_ack_of_unknown_tag_fails() {
        let broker = MemoryBroker::new();
        broker.declare(&addr("q")).await.unwrap();
        let mut consumer = broker.subscribe(&addr("q")).await.unwrap();
        assert!(consumer.ack(7).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_purges_and_wakes_consumer() {
        let broker = MemoryBroker::new();
        broker.declare(&addr("q")).await.unwrap();
        let mut consumer = broker.subscribe(&addr("q")).await.unwrap();
        let waiter = tokio::spawn(async move { consumer.next().await });
        tokio::task::yield_now().await;

        assert_eq!(broker.delete(&addr("q")).await.unwrap(), 0);
        assert!(waiter.await.unwrap().is_none());
        assert_eq!(broker.delete(&addr("q")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exclusive_addresses_are_unique() {
        let broker = MemoryBroker::new();
        let a = broker.declare_exclusive().await.unwrap();
        let b = broker.declare_exclusive().await.unwrap();
        assert_ne!(a, b);
        assert_eq!(broker.depth(&a), Some(0));
    }
}
