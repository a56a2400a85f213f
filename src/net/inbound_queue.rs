//! Hand-off from transport tasks to the frame loop
//!
//! Uses a bounded crossbeam channel: reader tasks submit envelopes without
//! blocking, and the frame loop drains everything pending at the start of
//! each frame, in arrival order.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

use crate::net::protocol::Envelope;

/// Why a submission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Queue is full; the envelope was dropped
    #[error("inbound queue full")]
    Full,
    /// The frame loop has gone away
    #[error("inbound queue disconnected")]
    Disconnected,
}

/// Bounded FIFO of inbound envelopes
pub struct InboundQueue {
    sender: Sender<Envelope>,
    receiver: Receiver<Envelope>,
    capacity: usize,
}

impl InboundQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Handle for a transport task
    pub fn sender(&self) -> InboundSender {
        InboundSender {
            sender: self.sender.clone(),
        }
    }

    /// Everything pending right now, oldest first
    pub fn drain(&self) -> Vec<Envelope> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new(crate::world::constants::net::DEFAULT_INBOUND_CAPACITY)
    }
}

/// Clonable submit handle
#[derive(Clone)]
pub struct InboundSender {
    sender: Sender<Envelope>,
}

impl InboundSender {
    /// Submit without blocking. A full queue drops the newest envelope.
    pub fn try_send(&self, envelope: Envelope) -> Result<(), QueueError> {
        self.sender.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(dropped) => {
                warn!(
                    "Inbound queue full, dropping {}/{}",
                    dropped.channel, dropped.event
                );
                QueueError::Full
            }
            TrySendError::Disconnected(_) => QueueError::Disconnected,
        })
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.sender.is_full()
    }

    /// Nothing is waiting for the frame loop
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}
