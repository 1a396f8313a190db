//! Per-remote connection handle
//!
//! Wraps one transport with the negotiation bookkeeping the exchange
//! protocol requires: candidates received before the remote description
//! are buffered and flushed in arrival order once it lands, a remote
//! answer is applied exactly once, and teardown is idempotent.

use crate::peer::transport::{LinkState, NegotiationRole, PeerTransport};
use crate::signaling::CandidateInit;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

struct Negotiation {
    /// Candidates that arrived before the remote description
    pending_candidates: Vec<CandidateInit>,
    /// A remote description has been installed; candidates apply directly
    remote_description_set: bool,
    /// The remote answer (or offer, for responders) has been consumed
    remote_handled: bool,
}

/// One live connection to a remote peer
pub struct ConnectionHandle {
    remote_id: String,
    role: NegotiationRole,
    transport: Arc<dyn PeerTransport>,
    negotiation: Mutex<Negotiation>,
    link_state: RwLock<LinkState>,
    closed: AtomicBool,
}

impl ConnectionHandle {
    /// Wrap a transport for the given remote peer
    pub fn new(
        remote_id: impl Into<String>,
        role: NegotiationRole,
        transport: Arc<dyn PeerTransport>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            role,
            transport,
            negotiation: Mutex::new(Negotiation {
                pending_candidates: Vec::new(),
                remote_description_set: false,
                remote_handled: false,
            }),
            link_state: RwLock::new(LinkState::New),
            closed: AtomicBool::new(false),
        }
    }

    /// The remote peer this handle is bound to
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Which side of the exchange this handle plays
    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    /// Last observed link state
    pub async fn link_state(&self) -> LinkState {
        *self.link_state.read().await
    }

    /// Record a link-state change reported by the transport
    pub async fn set_link_state(&self, state: LinkState) {
        *self.link_state.write().await = state;
    }

    /// Whether the handle has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Create the local offer. Initiator side only.
    pub async fn initiate(&self) -> Result<String> {
        if self.role != NegotiationRole::Initiator {
            return Err(Error::InvalidState(
                "only the initiating side creates offers".to_string(),
            ));
        }
        self.transport.create_offer().await
    }

    /// Apply a remote offer and produce the answer. Responder side only.
    ///
    /// Returns `Ok(None)` when an offer was already handled; a redelivered
    /// offer is ignored instead of renegotiating.
    pub async fn respond(&self, offer_sdp: &str) -> Result<Option<String>> {
        if self.role != NegotiationRole::Responder {
            return Err(Error::InvalidState(
                "only the responding side answers offers".to_string(),
            ));
        }
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.remote_handled {
            debug!(remote_id = %self.remote_id, "Ignoring duplicate offer");
            return Ok(None);
        }
        let answer = self.transport.create_answer(offer_sdp).await?;
        negotiation.remote_handled = true;
        negotiation.remote_description_set = true;
        self.flush_pending(&mut negotiation).await;
        Ok(Some(answer))
    }

    /// Apply the remote answer. Initiator side only.
    ///
    /// Returns `false` when an answer was already applied; only the first
    /// delivery of an answer takes effect.
    pub async fn apply_answer(&self, answer_sdp: &str) -> Result<bool> {
        if self.role != NegotiationRole::Initiator {
            return Err(Error::InvalidState(
                "only the initiating side applies answers".to_string(),
            ));
        }
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.remote_handled {
            debug!(remote_id = %self.remote_id, "Ignoring duplicate answer");
            return Ok(false);
        }
        self.transport.apply_answer(answer_sdp).await?;
        negotiation.remote_handled = true;
        negotiation.remote_description_set = true;
        self.flush_pending(&mut negotiation).await;
        Ok(true)
    }

    /// Apply or buffer a remote candidate.
    ///
    /// Candidates arriving before the remote description are held and
    /// flushed in arrival order once it is set; none are dropped and none
    /// are applied early.
    pub async fn add_candidate(&self, candidate: CandidateInit) -> Result<()> {
        let mut negotiation = self.negotiation.lock().await;
        if negotiation.remote_description_set {
            self.transport.add_remote_candidate(candidate).await
        } else {
            debug!(
                remote_id = %self.remote_id,
                buffered = negotiation.pending_candidates.len() + 1,
                "Buffering candidate before remote description"
            );
            negotiation.pending_candidates.push(candidate);
            Ok(())
        }
    }

    async fn flush_pending(&self, negotiation: &mut Negotiation) {
        for candidate in negotiation.pending_candidates.drain(..) {
            if let Err(e) = self.transport.add_remote_candidate(candidate).await {
                warn!(remote_id = %self.remote_id, error = %e, "Buffered candidate rejected");
            }
        }
    }

    /// Close the underlying transport. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.link_state.write().await = LinkState::Closed;
        if let Err(e) = self.transport.close().await {
            warn!(remote_id = %self.remote_id, error = %e, "Error closing transport");
        }
    }
}
