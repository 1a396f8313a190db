//! Signaling exchange: wire types and the channel adapter contract

pub mod channel;
pub mod memory;
pub mod protocol;

pub use channel::{SignalSubscription, SignalingChannel};
pub use memory::InMemoryChannel;
pub use protocol::{
    CandidateInit, Invitation, SessionKind, SessionRecord, SessionStatus, Signal, SignalBody,
};
