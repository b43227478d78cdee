//! Broker over TCP.
//!
//! [`BrokerServer`] exposes a [`MemoryBroker`] to remote processes and
//! [`TcpChannel`] is the matching client. Frames are newline-delimited JSON.
//! Each request carries an `id` echoed by its reply; deliveries are pushed
//! unsolicited and tagged with a subscription id chosen by the client.
//!
//! Prefetch one holds end to end: the server forwards the next delivery of a
//! subscription only after the client acked the previous one.

use super::{
    ChannelError, Consumer, Delivery, DeliveryTag, MemoryBroker, MessageChannel, Subscription,
};
use crate::protocol::{Address, Envelope};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─────────────────────────────────────────────────────────────
//  Frames
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Declare {
        id: u64,
        address: Address,
    },
    DeclareExclusive {
        id: u64,
    },
    Publish {
        id: u64,
        address: Address,
        envelope: Envelope,
    },
    Subscribe {
        id: u64,
        subscription: u64,
        address: Address,
    },
    Ack {
        id: u64,
        subscription: u64,
        tag: DeliveryTag,
    },
    Cancel {
        subscription: u64,
    },
    Delete {
        id: u64,
        address: Address,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Reply {
    Done,
    Declared { address: Address },
    Purged { count: usize },
    Failed { error: ChannelError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
enum ServerFrame {
    Reply { id: u64, reply: Reply },
    Delivery { subscription: u64, delivery: Delivery },
    Closed { subscription: u64 },
}

async fn write_frames<W, T>(mut writer: W, mut frames: mpsc::UnboundedReceiver<T>)
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    while let Some(frame) = frames.recv().await {
        let mut line = match serde_json::to_string(&frame) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to encode frame");
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            debug!(error = %e, "Connection closed while writing");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

// ─────────────────────────────────────────────────────────────
//  Server
// ─────────────────────────────────────────────────────────────

/// TCP front end for a [`MemoryBroker`].
pub struct BrokerServer {
    broker: MemoryBroker,
    listener: TcpListener,
}

impl BrokerServer {
    /// Binds the listener.
    #[instrument(skip(broker))]
    pub async fn bind(addr: &str, broker: MemoryBroker) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(addr).await.map_err(ChannelError::io)?;
        Ok(Self { broker, listener })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        self.listener.local_addr().map_err(ChannelError::io)
    }

    /// Accepts connections until the listener fails.
    #[instrument(skip(self))]
    pub async fn run(self) -> Result<(), ChannelError> {
        info!(addr = ?self.listener.local_addr().ok(), "Broker listening");
        loop {
            let (stream, peer) = self.listener.accept().await.map_err(ChannelError::io)?;
            if let Err(e) = stream.set_nodelay(true) {
                warn!(%peer, error = %e, "Unable to disable buffering");
            }
            info!(%peer, "Client connected");
            let broker = self.broker.clone();
            tokio::spawn(async move {
                serve_connection(broker, stream).await;
                info!(%peer, "Client disconnected");
            });
        }
    }
}

#[instrument(skip_all)]
async fn serve_connection(broker: MemoryBroker, stream: TcpStream) {
    let (read, write) = stream.into_split();
    let (out, frames) = mpsc::unbounded_channel::<ServerFrame>();
    let writer = tokio::spawn(write_frames(write, frames));

    let mut forwarders: HashMap<u64, (mpsc::UnboundedSender<DeliveryTag>, JoinHandle<()>)> =
        HashMap::new();
    let mut lines = BufReader::new(read).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Read error");
                break;
            }
        };
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Discarding undecodable request");
                continue;
            }
        };

        let (id, reply) = match request {
            Request::Declare { id, address } => (id, done(broker.declare(&address).await)),
            Request::DeclareExclusive { id } => match broker.declare_exclusive().await {
                Ok(address) => (id, Reply::Declared { address }),
                Err(error) => (id, Reply::Failed { error }),
            },
            Request::Publish {
                id,
                address,
                envelope,
            } => (id, done(broker.publish(&address, envelope).await)),
            Request::Delete { id, address } => match broker.delete(&address).await {
                Ok(count) => (id, Reply::Purged { count }),
                Err(error) => (id, Reply::Failed { error }),
            },
            Request::Subscribe {
                id,
                subscription,
                address,
            } => match broker.subscribe(&address).await {
                Ok(consumer) => {
                    // Reply first so the subscription is confirmed before any delivery.
                    let _ = out.send(ServerFrame::Reply {
                        id,
                        reply: Reply::Done,
                    });
                    let (acks, ack_rx) = mpsc::unbounded_channel();
                    let task = tokio::spawn(forward(subscription, consumer, ack_rx, out.clone()));
                    if let Some((_, old)) = forwarders.insert(subscription, (acks, task)) {
                        old.abort();
                        let _ = old.await;
                    }
                    continue;
                }
                Err(error) => (id, Reply::Failed { error }),
            },
            Request::Ack {
                id,
                subscription,
                tag,
            } => match forwarders.get(&subscription) {
                Some((acks, _)) if acks.send(tag).is_ok() => (id, Reply::Done),
                _ => (
                    id,
                    Reply::Failed {
                        error: ChannelError::UnknownDelivery { tag },
                    },
                ),
            },
            Request::Cancel { subscription } => {
                if let Some((_, task)) = forwarders.remove(&subscription) {
                    // Wait for the consumer to drop so a following delete
                    // sees any requeued delivery.
                    task.abort();
                    let _ = task.await;
                    debug!(subscription, "Subscription cancelled");
                }
                continue;
            }
        };

        if out.send(ServerFrame::Reply { id, reply }).is_err() {
            break;
        }
    }

    // Aborting drops each consumer, which requeues its in-flight delivery.
    for (_, (_, task)) in forwarders.drain() {
        task.abort();
        let _ = task.await;
    }
    drop(out);
    let _ = writer.await;
}

fn done(result: Result<(), ChannelError>) -> Reply {
    match result {
        Ok(()) => Reply::Done,
        Err(error) => Reply::Failed { error },
    }
}

async fn forward(
    subscription: u64,
    mut consumer: Subscription,
    mut acks: mpsc::UnboundedReceiver<DeliveryTag>,
    out: mpsc::UnboundedSender<ServerFrame>,
) {
    while let Some(delivery) = consumer.next().await {
        let tag = delivery.tag;
        if out
            .send(ServerFrame::Delivery {
                subscription,
                delivery,
            })
            .is_err()
        {
            return;
        }
        loop {
            match acks.recv().await {
                Some(acked) if acked == tag => {
                    if let Err(e) = consumer.ack(tag).await {
                        warn!(subscription, error = %e, "Ack failed");
                    }
                    break;
                }
                Some(stale) => debug!(subscription, stale, "Ignoring ack for stale tag"),
                None => return,
            }
        }
    }
    debug!(subscription, address = %consumer.address(), "Address closed");
    let _ = out.send(ServerFrame::Closed { subscription });
}

// ─────────────────────────────────────────────────────────────
//  Client
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Shared {
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    subscriptions: Mutex<HashMap<u64, mpsc::UnboundedSender<Delivery>>>,
    closed: AtomicBool,
}

/// [`MessageChannel`] backed by a remote [`BrokerServer`].
///
/// Cloning shares the connection. The connection closes once every clone and
/// every subscription made through it is dropped.
#[derive(Debug, Clone)]
pub struct TcpChannel {
    out: mpsc::UnboundedSender<Request>,
    shared: Arc<Shared>,
    next_id: Arc<AtomicU64>,
}

impl TcpChannel {
    /// Connects to a broker.
    #[instrument]
    pub async fn connect(addr: &str) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr).await.map_err(ChannelError::io)?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Unable to disable buffering");
        }
        let (read, write) = stream.into_split();
        let (out, requests) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        tokio::spawn(write_frames(write, requests));
        tokio::spawn(read_frames(read, shared.clone()));

        info!("Connected to broker");
        Ok(Self {
            out,
            shared,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call(&self, request: impl FnOnce(u64) -> Request) -> Result<Reply, ChannelError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(id, tx);
        if self.shared.closed.load(Ordering::SeqCst) || self.out.send(request(id)).is_err() {
            lock(&self.shared.pending).remove(&id);
            return Err(ChannelError::Disconnected);
        }
        match rx.await.map_err(|_| ChannelError::Disconnected)? {
            Reply::Failed { error } => Err(error),
            reply => Ok(reply),
        }
    }
}

async fn read_frames(read: OwnedReadHalf, shared: Arc<Shared>) {
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Broker read error");
                break;
            }
        };
        match serde_json::from_str::<ServerFrame>(&line) {
            Ok(ServerFrame::Reply { id, reply }) => {
                if let Some(waiter) = lock(&shared.pending).remove(&id) {
                    let _ = waiter.send(reply);
                }
            }
            Ok(ServerFrame::Delivery {
                subscription,
                delivery,
            }) => {
                let sender = lock(&shared.subscriptions).get(&subscription).cloned();
                match sender {
                    Some(sender) => {
                        let _ = sender.send(delivery);
                    }
                    None => debug!(subscription, "Delivery for released subscription"),
                }
            }
            Ok(ServerFrame::Closed { subscription }) => {
                // Dropping the sender ends the consumer's stream.
                lock(&shared.subscriptions).remove(&subscription);
                debug!(subscription, "Subscription closed by broker");
            }
            Err(e) => warn!(error = %e, "Discarding undecodable frame"),
        }
    }

    warn!("Broker connection lost");
    shared.closed.store(true, Ordering::SeqCst);
    lock(&shared.pending).clear();
    lock(&shared.subscriptions).clear();
}

#[async_trait::async_trait]
impl MessageChannel for TcpChannel {
    async fn declare(&self, address: &Address) -> Result<(), ChannelError> {
        let address = address.clone();
        self.call(|id| Request::Declare { id, address }).await?;
        Ok(())
    }

    async fn declare_exclusive(&self) -> Result<Address, ChannelError> {
        match self.call(|id| Request::DeclareExclusive { id }).await? {
            Reply::Declared { address } => Ok(address),
            other => Err(ChannelError::io(format!("unexpected reply {other:?}"))),
        }
    }

    async fn publish(&self, address: &Address, envelope: Envelope) -> Result<(), ChannelError> {
        let address = address.clone();
        self.call(|id| Request::Publish {
            id,
            address,
            envelope,
        })
        .await?;
        Ok(())
    }

    async fn subscribe(&self, address: &Address) -> Result<Subscription, ChannelError> {
        let subscription = self.next_id();
        let (tx, deliveries) = mpsc::unbounded_channel();
        lock(&self.shared.subscriptions).insert(subscription, tx);

        let target = address.clone();
        let result = self
            .call(|id| Request::Subscribe {
                id,
                subscription,
                address: target,
            })
            .await;
        if let Err(e) = result {
            lock(&self.shared.subscriptions).remove(&subscription);
            return Err(e);
        }

        Ok(Box::new(TcpConsumer {
            address: address.clone(),
            subscription,
            deliveries,
            in_flight: None,
            channel: self.clone(),
        }))
    }

    async fn delete(&self, address: &Address) -> Result<usize, ChannelError> {
        let address = address.clone();
        match self.call(|id| Request::Delete { id, address }).await? {
            Reply::Purged { count } => Ok(count),
            other => Err(ChannelError::io(format!("unexpected reply {other:?}"))),
        }
    }
}

struct TcpConsumer {
    address: Address,
    subscription: u64,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    in_flight: Option<Delivery>,
    channel: TcpChannel,
}

#[async_trait::async_trait]
impl Consumer for TcpConsumer {
    fn address(&self) -> &Address {
        &self.address
    }

    async fn next(&mut self) -> Option<Delivery> {
        if let Some(delivery) = self.in_flight.as_mut() {
            delivery.redelivered = true;
            return Some(delivery.clone());
        }
        let delivery = self.deliveries.recv().await?;
        self.in_flight = Some(delivery.clone());
        Some(delivery)
    }

    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), ChannelError> {
        if self.in_flight.as_ref().map(|d| d.tag) != Some(tag) {
            return Err(ChannelError::UnknownDelivery { tag });
        }
        let subscription = self.subscription;
        self.channel
            .call(|id| Request::Ack {
                id,
                subscription,
                tag,
            })
            .await?;
        self.in_flight = None;
        Ok(())
    }
}

impl Drop for TcpConsumer {
    fn drop(&mut self) {
        lock(&self.channel.shared.subscriptions).remove(&self.subscription);
        let _ = self.channel.out.send(Request::Cancel {
            subscription: self.subscription,
        });
    }
}
