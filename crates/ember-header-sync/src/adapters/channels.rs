//! # Channel Sink Adapters
//!
//! Outbound-port implementations over tokio mpsc channels. The engine loop
//! must never block on a slow consumer, so every send is a `try_send` that
//! drops and logs when the channel is full; closure means the consumer is
//! shutting down.

use crate::domain::{ChainRange, HeaderRequest, PeerPenalty};
use crate::ports::outbound::{ChainEventSink, HeaderRequestSink, PenaltySink};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Header requests over an mpsc channel.
#[derive(Clone)]
pub struct ChannelRequestSink {
    tx: mpsc::Sender<HeaderRequest>,
}

impl ChannelRequestSink {
    /// Wrap a channel sender.
    pub fn new(tx: mpsc::Sender<HeaderRequest>) -> Self {
        Self { tx }
    }
}

impl HeaderRequestSink for ChannelRequestSink {
    fn send_request(&self, request: HeaderRequest) {
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("request channel full, dropping header request");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("request channel closed");
            }
        }
    }
}

/// Peer penalties over an mpsc channel.
#[derive(Clone)]
pub struct ChannelPenaltySink {
    tx: mpsc::Sender<PeerPenalty>,
}

impl ChannelPenaltySink {
    /// Wrap a channel sender.
    pub fn new(tx: mpsc::Sender<PeerPenalty>) -> Self {
        Self { tx }
    }
}

impl PenaltySink for ChannelPenaltySink {
    fn send_penalty(&self, penalty: PeerPenalty) {
        match self.tx.try_send(penalty) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("penalty channel full, dropping penalty report");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("penalty channel closed");
            }
        }
    }
}

/// Initiated chains over an mpsc channel.
#[derive(Clone)]
pub struct ChannelChainSink {
    tx: mpsc::Sender<ChainRange>,
}

impl ChannelChainSink {
    /// Wrap a channel sender.
    pub fn new(tx: mpsc::Sender<ChainRange>) -> Self {
        Self { tx }
    }
}

impl ChainEventSink for ChannelChainSink {
    fn send_chain(&self, range: ChainRange) {
        match self.tx.try_send(range) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("chain channel full, dropping chain range");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("chain channel closed");
            }
        }
    }
}
