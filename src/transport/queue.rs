//! # Transport Queue
//!
//! Bridges the link's receive handler, which runs on whatever task or
//! thread the link driver uses, to a single consumer loop.
//!
//! The handler pushes onto a mutex-guarded FIFO; the consumer polls it with
//! [`TransportQueue::available`] / [`TransportQueue::pop`] or awaits
//! [`TransportQueue::recv`].
//!
//! # Example
//!
//! ```
//! use telemetry_recorder::transport::{MacAddress, PacketQueue};
//!
//! let queue = PacketQueue::new(None);
//! let handler = queue.receive_handler();
//! handler(MacAddress::BROADCAST, &[1, 2, 3]);
//!
//! assert_eq!(queue.available(), 1);
//! let packet = queue.pop().unwrap();
//! assert_eq!(packet.payload.as_ref(), &[1, 2, 3]);
//! assert!(queue.pop().is_none());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::address::MacAddress;
use super::link::{Link, LinkReceiver, ReceiveHandler};
use crate::error::{Result, TelemetryError};

/// Largest payload carried by one packet
pub const MAX_PAYLOAD: usize = 256;

/// A received payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sender address
    pub source: MacAddress,
    /// Payload, at most [`MAX_PAYLOAD`] bytes
    pub payload: Bytes,
    /// Length the link reported before truncation
    pub declared_len: usize,
    pub received_at: DateTime<Utc>,
}

impl Packet {
    /// Copy up to [`MAX_PAYLOAD`] bytes of `data` into a new packet
    pub fn new(source: MacAddress, data: &[u8]) -> Self {
        let kept = data.len().min(MAX_PAYLOAD);
        Self {
            source,
            payload: Bytes::copy_from_slice(&data[..kept]),
            declared_len: data.len(),
            received_at: Utc::now(),
        }
    }

    /// Stored payload length
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.declared_len > self.payload.len()
    }
}

struct Shared {
    packets: Mutex<VecDeque<Packet>>,
    capacity: Option<usize>,
    notify: Notify,
    dropped: AtomicU64,
}

/// Thread-safe FIFO of received packets
///
/// Clones share the same queue. When bounded, pushing onto a full queue
/// discards the oldest packet.
#[derive(Clone)]
pub struct PacketQueue {
    shared: Arc<Shared>,
}

impl PacketQueue {
    /// Create a queue, bounded to `capacity` packets if given
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                packets: Mutex::new(VecDeque::new()),
                capacity,
                notify: Notify::new(),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    // A panic while holding the lock cannot leave the deque half-updated,
    // so a poisoned lock is still usable.
    fn packets(&self) -> MutexGuard<'_, VecDeque<Packet>> {
        self.shared
            .packets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, packet: Packet) {
        {
            let mut packets = self.packets();
            if let Some(capacity) = self.shared.capacity {
                while packets.len() >= capacity.max(1) {
                    packets.pop_front();
                    let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!("Packet queue full, dropped oldest packet ({} total)", dropped);
                }
            }
            packets.push_back(packet);
        }
        self.shared.notify.notify_one();
    }

    /// Packets waiting to be popped
    pub fn available(&self) -> usize {
        self.packets().len()
    }

    /// Oldest packet, or `None` when the queue is empty
    pub fn pop(&self) -> Option<Packet> {
        self.packets().pop_front()
    }

    /// Wait for the next packet
    pub async fn recv(&self) -> Packet {
        loop {
            if let Some(packet) = self.pop() {
                return packet;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Packets discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> Option<usize> {
        self.shared.capacity
    }

    /// Handler for [`LinkReceiver::on_receive`] that pushes onto this queue
    pub fn receive_handler(&self) -> ReceiveHandler {
        let queue = self.clone();
        Box::new(move |source, data| {
            let packet = Packet::new(source, data);
            if packet.is_truncated() {
                warn!(
                    "Truncated {} byte packet from {} to {} bytes",
                    packet.declared_len,
                    source,
                    packet.len()
                );
            } else {
                debug!("Received {} bytes from {}", packet.len(), source);
            }
            queue.push(packet);
        })
    }
}

impl fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketQueue")
            .field("available", &self.available())
            .field("capacity", &self.shared.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Which end of the link a transport serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

enum Endpoint {
    Sender {
        link: Box<dyn Link>,
        destination: MacAddress,
    },
    Receiver {
        queue: PacketQueue,
    },
}

/// Role-bound transport over an unreliable link
pub struct TransportQueue {
    endpoint: Endpoint,
}

impl TransportQueue {
    /// Transport that sends every payload to `destination`
    pub fn sender(link: Box<dyn Link>, destination: MacAddress) -> Self {
        debug!("Transport ready as sender to {}", destination);
        Self {
            endpoint: Endpoint::Sender { link, destination },
        }
    }

    /// Transport that queues everything `link` receives
    pub fn receiver<R: LinkReceiver + ?Sized>(link: &mut R, capacity: Option<usize>) -> Self {
        let queue = PacketQueue::new(capacity);
        link.on_receive(queue.receive_handler());
        debug!("Transport ready as receiver (capacity {:?})", capacity);
        Self {
            endpoint: Endpoint::Receiver { queue },
        }
    }

    pub fn role(&self) -> Role {
        match self.endpoint {
            Endpoint::Sender { .. } => Role::Sender,
            Endpoint::Receiver { .. } => Role::Receiver,
        }
    }

    /// Hand `payload` to the link; failures are not retried
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::TransportFailure`] on a receiver, for a
    /// payload over [`MAX_PAYLOAD`] bytes, or when the link rejects it.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        let Endpoint::Sender { link, destination } = &self.endpoint else {
            return Err(TelemetryError::TransportFailure(
                "transport is a receiver".to_string(),
            ));
        };

        if payload.len() > MAX_PAYLOAD {
            return Err(TelemetryError::TransportFailure(format!(
                "payload of {} bytes exceeds {} byte packet",
                payload.len(),
                MAX_PAYLOAD
            )));
        }

        link.send(destination, payload).map_err(|e| {
            TelemetryError::TransportFailure(format!("send to {} failed: {}", destination, e))
        })
    }

    /// Packets waiting; always 0 on a sender
    pub fn available(&self) -> usize {
        self.queue().map_or(0, PacketQueue::available)
    }

    /// Oldest received packet, `None` when empty or on a sender
    pub fn pop(&self) -> Option<Packet> {
        self.queue().and_then(PacketQueue::pop)
    }

    /// Wait for the next packet; `None` immediately on a sender
    pub async fn recv(&self) -> Option<Packet> {
        match self.queue() {
            Some(queue) => Some(queue.recv().await),
            None => None,
        }
    }

    /// Receive queue, if this is a receiver
    pub fn queue(&self) -> Option<&PacketQueue> {
        match &self.endpoint {
            Endpoint::Receiver { queue } => Some(queue),
            Endpoint::Sender { .. } => None,
        }
    }
}

impl fmt::Debug for TransportQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint {
            Endpoint::Sender { destination, .. } => f
                .debug_struct("TransportQueue")
                .field("role", &Role::Sender)
                .field("destination", destination)
                .finish_non_exhaustive(),
            Endpoint::Receiver { queue } => f
                .debug_struct("TransportQueue")
                .field("role", &Role::Receiver)
                .field("queue", queue)
                .finish(),
        }
    }
}
