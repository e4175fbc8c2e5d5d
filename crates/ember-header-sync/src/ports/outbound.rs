//! # Outbound Ports
//!
//! Traits for the engine's external collaborators: the consensus rules it
//! validates against, the wall clock, and the sinks it emits requests,
//! penalties, and initiated chains into. Sink implementations must never
//! block the engine loop.

use crate::domain::{BlockHeader, ChainRange, HeaderRequest, PeerPenalty, SealError};
use ember_types::{Hash, U256};
use parking_lot::Mutex;
use std::sync::Arc;

/// Consensus rules - outbound port.
pub trait ConsensusRules: Send + Sync {
    /// Expected child difficulty given the parent header fields.
    fn calc_difficulty(
        &self,
        child_timestamp: u64,
        parent_timestamp: u64,
        parent_difficulty: U256,
        parent_number: u64,
        parent_hash: Hash,
        parent_uncle_hash: Hash,
    ) -> U256;

    /// Proof-of-work seal check on a single header.
    fn verify_seal(&self, header: &BlockHeader) -> Result<(), SealError>;
}

/// Wall-clock source - outbound port.
pub trait Clock: Send + Sync {
    /// Current Unix time in seconds.
    fn unix_now(&self) -> u64;
}

/// Header-request sink - outbound port.
pub trait HeaderRequestSink: Send + Sync {
    /// Emit an outgoing header request. Fire-and-forget.
    fn send_request(&self, request: HeaderRequest);
}

/// Peer-penalty sink - outbound port.
pub trait PenaltySink: Send + Sync {
    /// Emit a penalty report. Fire-and-forget.
    fn send_penalty(&self, penalty: PeerPenalty);
}

/// Initiated-chain sink - outbound port.
pub trait ChainEventSink: Send + Sync {
    /// Deliver a validated chain range to the downstream stage.
    fn send_chain(&self, range: ChainRange);
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock consensus rules: child difficulty is parent difficulty plus a fixed
/// step, and the seal check optionally bounds the nonce.
#[derive(Clone, Debug)]
pub struct MockConsensusRules {
    /// Added to the parent difficulty by `calc_difficulty`.
    pub difficulty_step: u64,
    /// When set, any nonce above this fails `verify_seal`.
    pub max_nonce: Option<u64>,
}

impl Default for MockConsensusRules {
    fn default() -> Self {
        Self {
            difficulty_step: 1000,
            max_nonce: None,
        }
    }
}

impl MockConsensusRules {
    /// Rules that reject every nonce above zero.
    pub fn rejecting_nonzero_nonce() -> Self {
        Self {
            max_nonce: Some(0),
            ..Default::default()
        }
    }
}

impl ConsensusRules for MockConsensusRules {
    fn calc_difficulty(
        &self,
        _child_timestamp: u64,
        _parent_timestamp: u64,
        parent_difficulty: U256,
        _parent_number: u64,
        _parent_hash: Hash,
        _parent_uncle_hash: Hash,
    ) -> U256 {
        parent_difficulty + U256::from(self.difficulty_step)
    }

    fn verify_seal(&self, header: &BlockHeader) -> Result<(), SealError> {
        if let Some(max) = self.max_nonce {
            if header.nonce > max {
                return Err(SealError(format!("wrong nonce: {}", header.nonce)));
            }
        }
        Ok(())
    }
}

/// Mock clock pinned to a fixed instant.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn unix_now(&self) -> u64 {
        self.0
    }
}

/// Recording sink collecting everything the engine emits.
#[derive(Clone, Default)]
pub struct RecordingSink {
    requests: Arc<Mutex<Vec<HeaderRequest>>>,
    penalties: Arc<Mutex<Vec<PeerPenalty>>>,
    chains: Arc<Mutex<Vec<ChainRange>>>,
}

impl RecordingSink {
    /// New empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests emitted so far.
    pub fn requests(&self) -> Vec<HeaderRequest> {
        self.requests.lock().clone()
    }

    /// Penalties emitted so far.
    pub fn penalties(&self) -> Vec<PeerPenalty> {
        self.penalties.lock().clone()
    }

    /// Chain ranges emitted so far.
    pub fn chains(&self) -> Vec<ChainRange> {
        self.chains.lock().clone()
    }
}

impl HeaderRequestSink for RecordingSink {
    fn send_request(&self, request: HeaderRequest) {
        self.requests.lock().push(request);
    }
}

impl PenaltySink for RecordingSink {
    fn send_penalty(&self, penalty: PeerPenalty) {
        self.penalties.lock().push(penalty);
    }
}

impl ChainEventSink for RecordingSink {
    fn send_chain(&self, range: ChainRange) {
        self.chains.lock().push(range);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_rules_difficulty_step() {
        let rules = MockConsensusRules::default();
        let difficulty = rules.calc_difficulty(
            0,
            0,
            U256::from(10u64),
            1,
            [0u8; 32],
            [0u8; 32],
        );
        assert_eq!(difficulty, U256::from(1010u64));
    }

    #[test]
    fn test_mock_rules_accept_any_seal_by_default() {
        let rules = MockConsensusRules::default();
        let header = BlockHeader {
            nonce: 99,
            ..Default::default()
        };
        assert!(rules.verify_seal(&header).is_ok());
    }

    #[test]
    fn test_mock_rules_reject_nonzero_nonce() {
        let rules = MockConsensusRules::rejecting_nonzero_nonce();
        let good = BlockHeader::default();
        let bad = BlockHeader {
            nonce: 1,
            ..Default::default()
        };
        assert!(rules.verify_seal(&good).is_ok());
        assert!(rules.verify_seal(&bad).is_err());
    }

    #[test]
    fn test_recording_sink_collects() {
        let sink = RecordingSink::new();
        sink.send_request(HeaderRequest {
            hash: [1u8; 32],
            length: 192,
        });
        assert_eq!(sink.requests().len(), 1);
        assert!(sink.penalties().is_empty());
    }
}
