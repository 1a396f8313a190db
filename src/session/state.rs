//! Session lifecycle phases and end reasons

/// Phase of a session from the local participant's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No session in progress
    Idle,
    /// Outgoing call placed, waiting for the remote side to pick up
    Ringing,
    /// Negotiation and connectivity establishment under way
    Connecting,
    /// Media flowing
    Active,
    /// Torn down; terminal
    Ended,
}

impl SessionPhase {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Ringing)
                | (Idle, Connecting)
                | (Idle, Ended)
                | (Ringing, Connecting)
                | (Ringing, Ended)
                | (Connecting, Active)
                | (Connecting, Ended)
                | (Active, Ended)
        )
    }

    /// Whether the session has reached its terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Ended)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Ringing => "ringing",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Active => "active",
            SessionPhase::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// This side hung up
    HungUp,
    /// The remote side declined the call before it connected
    Rejected,
    /// Removed from the broadcast by the host
    Removed,
    /// The remote side never picked up within the ring timeout
    NoAnswer,
    /// Offer/answer negotiation failed
    NegotiationFailed,
    /// Connectivity was lost and did not recover within the grace period
    ConnectionLost,
    /// The signaling channel became unusable
    ChannelFailed,
    /// The session record was closed remotely
    SessionClosed,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EndReason::HungUp => "hung up",
            EndReason::Rejected => "rejected",
            EndReason::Removed => "removed by host",
            EndReason::NoAnswer => "no answer",
            EndReason::NegotiationFailed => "negotiation failed",
            EndReason::ConnectionLost => "connection lost",
            EndReason::ChannelFailed => "signaling channel failed",
            EndReason::SessionClosed => "session closed",
        };
        write!(f, "{s}")
    }
}

/// Which part this participant plays in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Placed the call, answers the offer
    Caller,
    /// Picked up the call, creates the offer
    Callee,
    /// Owns the broadcast, answers every viewer's offer
    BroadcastHost,
    /// Joined the broadcast, creates the offer
    BroadcastViewer,
}

impl SessionRole {
    /// Whether this participant owns the session record and closes it on end
    pub fn has_authority(&self) -> bool {
        matches!(
            self,
            SessionRole::Caller | SessionRole::Callee | SessionRole::BroadcastHost
        )
    }

    /// Whether this participant serves many remote peers at once
    pub fn is_host(&self) -> bool {
        matches!(self, SessionRole::BroadcastHost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use SessionPhase::*;
        assert!(Idle.can_transition(Ringing));
        assert!(Idle.can_transition(Connecting));
        assert!(Ringing.can_transition(Connecting));
        assert!(Connecting.can_transition(Active));
        assert!(Active.can_transition(Ended));
        // Ended is reachable from anywhere
        for phase in [Idle, Ringing, Connecting, Active] {
            assert!(phase.can_transition(Ended));
        }
    }

    #[test]
    fn test_illegal_transitions() {
        use SessionPhase::*;
        assert!(!Idle.can_transition(Active));
        assert!(!Ringing.can_transition(Active));
        assert!(!Active.can_transition(Connecting));
        assert!(!Ended.can_transition(Idle));
        assert!(!Ended.can_transition(Ended));
    }

    #[test]
    fn test_role_authority() {
        assert!(SessionRole::Caller.has_authority());
        assert!(SessionRole::Callee.has_authority());
        assert!(SessionRole::BroadcastHost.has_authority());
        assert!(!SessionRole::BroadcastViewer.has_authority());
        assert!(SessionRole::BroadcastHost.is_host());
        assert!(!SessionRole::Callee.is_host());
    }
}
