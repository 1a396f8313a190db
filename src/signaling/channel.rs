//! Signaling channel adapter contract
//!
//! The shared message channel is an external collaborator: this core only
//! consumes its contract. Implementations must provide at-least-once,
//! order-preserving-per-sender delivery of signals addressed to a single
//! identity; the core is correct under redelivery but not under reordering
//! across senders.

use crate::signaling::protocol::{Invitation, SessionKind, SessionRecord, Signal};
use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Receiving side of a signal subscription
///
/// Delivers every signal whose `to` matches the subscribed identity for one
/// session, in per-sender publish order. Dropping the subscription stops
/// delivery.
pub struct SignalSubscription {
    rx: mpsc::UnboundedReceiver<Signal>,
}

impl SignalSubscription {
    /// Wrap a receiver handed out by a channel implementation
    pub fn new(rx: mpsc::UnboundedReceiver<Signal>) -> Self {
        Self { rx }
    }

    /// Receive the next signal, or `None` once the channel side is gone
    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }

    /// Stop receiving signals
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Contract of the external signaling channel adapter
///
/// `publish_signal` is fire-and-forget beyond acceptance: a successful
/// return means the signal was appended, not that it was delivered.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Create a session record.
    ///
    /// Calls pass the invited identity so the channel can surface a pending
    /// invitation to it; broadcasts pass `None` and start out active.
    async fn create_session(
        &self,
        kind: SessionKind,
        host_id: &str,
        invitee: Option<&str>,
    ) -> Result<SessionRecord>;

    /// Fetch the current session record
    async fn get_session(&self, session_id: &str) -> Result<SessionRecord>;

    /// Mark a session ended. Idempotent.
    async fn end_session(&self, session_id: &str) -> Result<()>;

    /// Append a signal to the session's log and deliver it to the
    /// subscriber matching `signal.to`
    async fn publish_signal(&self, session_id: &str, signal: Signal) -> Result<()>;

    /// Subscribe to signals addressed to `local_identity` in this session
    async fn subscribe_signals(
        &self,
        session_id: &str,
        local_identity: &str,
    ) -> Result<SignalSubscription>;

    /// Pending invitations addressed to `local_identity`
    async fn pending_invitations(&self, local_identity: &str) -> Result<Vec<Invitation>>;

    /// Register a viewer membership for a broadcast session.
    ///
    /// Fails with [`crate::Error::Admission`] when the session is not an
    /// active broadcast or the viewer was previously revoked.
    async fn register_viewer(&self, session_id: &str, viewer_id: &str) -> Result<()>;

    /// Mark a viewer membership revoked so any later `register_viewer` by
    /// the same identity is refused, independent of signal delivery
    async fn revoke_viewer(&self, session_id: &str, viewer_id: &str) -> Result<()>;
}
