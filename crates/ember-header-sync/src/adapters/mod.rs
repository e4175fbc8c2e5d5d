//! Infrastructure adapters: recovery-file persistence, the checkpoint
//! loader, channel-backed sinks, and the system clock.

pub mod channels;
pub mod checkpoints;
pub mod recovery;
pub mod time;

pub use channels::{ChannelChainSink, ChannelPenaltySink, ChannelRequestSink};
pub use checkpoints::{load_checkpoint_file, write_checkpoint_file, CHECKPOINT_RECORD_LEN};
pub use recovery::RecoveryBuffer;
pub use time::SystemClock;
