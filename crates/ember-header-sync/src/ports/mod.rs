//! API traits (inbound) and dependency traits (outbound).

pub mod inbound;
pub mod outbound;

pub use inbound::HeaderSyncApi;
pub use outbound::{
    ChainEventSink, Clock, ConsensusRules, FixedClock, HeaderRequestSink, MockConsensusRules,
    PenaltySink, RecordingSink,
};
