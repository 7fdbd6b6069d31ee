//! Bounded hand-off of decoded packets from transport tasks to the
//! simulation thread.
//!
//! Transport tasks never block on a full queue. What happens instead is the
//! connection's [`OverflowPolicy`]: the server drops the offending
//! connection, the client drops the packet.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, unbounded};

use crate::packet::Packet;

/// A packet together with the connection it arrived on.
#[derive(Debug)]
pub struct Inbound {
    /// Sender's client id (0 on the client side, where the peer is the server).
    pub client_id: u32,
    /// The decoded packet.
    pub packet: Packet,
}

/// Connection lifecycle notifications. These travel on an unbounded side
/// channel so a full packet queue can never swallow them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection was accepted and assigned this id.
    Connected(u32),
    /// The connection with this id is gone.
    Disconnected(u32),
}

/// What a transport task does when the inbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Close the connection that overflowed the queue.
    Disconnect,
    /// Discard the packet and keep reading.
    DropPacket,
}

/// Why a packet could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("inbound queue full")]
    Full,
    /// The simulation side has gone away.
    #[error("inbound queue closed")]
    Closed,
}

/// Producer half, cloned into every transport task.
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: Sender<Inbound>,
}

impl InboundSender {
    /// Queues `packet` without blocking.
    pub fn push(&self, client_id: u32, packet: Packet) -> Result<(), QueueError> {
        self.tx
            .try_send(Inbound { client_id, packet })
            .map_err(|e| match e {
                TrySendError::Full(_) => QueueError::Full,
                TrySendError::Disconnected(_) => QueueError::Closed,
            })
    }
}

/// Consumer half, owned by the network manager on the simulation thread.
#[derive(Debug)]
pub struct InboundReceiver {
    rx: Receiver<Inbound>,
}

impl InboundReceiver {
    /// Removes up to `max` queued packets in arrival order.
    pub fn drain(&self, max: usize) -> Vec<Inbound> {
        let mut out = Vec::with_capacity(max.min(self.rx.len()));
        while out.len() < max {
            match self.rx.try_recv() {
                Ok(inbound) => out.push(inbound),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Number of packets waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Creates a packet queue holding at most `capacity` packets.
pub fn inbound_queue(capacity: usize) -> (InboundSender, InboundReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (InboundSender { tx }, InboundReceiver { rx })
}

/// Creates the unbounded lifecycle channel.
pub fn event_channel() -> (Sender<ConnectionEvent>, Receiver<ConnectionEvent>) {
    unbounded()
}
