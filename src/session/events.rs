//! Events the session machine emits to the application

use crate::session::state::EndReason;
use crate::signaling::Invitation;

/// Lifecycle notifications delivered to the application in order
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The outbound invitation was placed and the remote side is being rung
    Ringing(Invitation),
    /// Negotiation with a remote peer started
    Connecting,
    /// Media is flowing
    Active,
    /// Connectivity to a remote peer degraded; recovery is still possible
    QualityDegraded { remote_id: String },
    /// The session ended; always the final event
    Ended(EndReason),
}

impl SessionEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Ringing(_) => "ringing",
            SessionEvent::Connecting => "connecting",
            SessionEvent::Active => "active",
            SessionEvent::QualityDegraded { .. } => "quality_degraded",
            SessionEvent::Ended(_) => "ended",
        }
    }
}
