//! Transport seam between the session layer and the peer-connection engine
//!
//! The session machine drives negotiation through [`PeerTransport`] and
//! never touches the engine directly, so the whole lifecycle can run
//! against a scripted transport in tests.

use crate::media::LocalMediaStream;
use crate::signaling::CandidateInit;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connectivity state of a single remote link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Created, negotiation not started
    New,
    /// Negotiating or establishing connectivity
    Connecting,
    /// Media flowing
    Connected,
    /// Connectivity interrupted, may recover within the grace period
    Disconnected,
    /// Connectivity failed, will not recover
    Failed,
    /// Closed locally
    Closed,
}

impl LinkState {
    /// Whether this state ends the link for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, LinkState::Failed | LinkState::Closed)
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkState::New => "new",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
            LinkState::Failed => "failed",
            LinkState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Events a transport pushes back to its owner
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A locally gathered candidate that must be relayed to the remote peer
    LocalCandidate(CandidateInit),
    /// The link changed connectivity state
    LinkState(LinkState),
}

/// Which side of the offer/answer exchange this transport plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// Creates the offer (callee or joining viewer)
    Initiator,
    /// Answers the offer (caller or broadcast host)
    Responder,
}

/// One peer-connection engine instance bound to a single remote peer
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create the local offer and install it as the local description
    async fn create_offer(&self) -> Result<String>;

    /// Apply a remote offer and produce the answer
    async fn create_answer(&self, offer_sdp: &str) -> Result<String>;

    /// Apply the remote answer to a previously created offer
    async fn apply_answer(&self, answer_sdp: &str) -> Result<()>;

    /// Apply a remote candidate. The caller guarantees a remote
    /// description is already installed.
    async fn add_remote_candidate(&self, candidate: CandidateInit) -> Result<()>;

    /// Tear the link down. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Factory producing one transport per remote peer
#[async_trait]
pub trait PeerTransportFactory: Send + Sync {
    /// Create a transport with the local stream attached and events
    /// delivered on `events`
    async fn create(
        &self,
        remote_id: &str,
        stream: &LocalMediaStream,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>>;
}
