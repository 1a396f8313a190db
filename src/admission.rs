//! Broadcast admission and moderation policy
//!
//! Membership is authoritative: a revocation recorded here outlives any
//! in-flight signal, so a removed viewer can never rejoin by replaying an
//! old exchange.

use crate::signaling::{SessionKind, SessionRecord, SessionStatus};
use crate::{Error, Result};
use std::collections::HashMap;

/// A viewer's standing in a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Admitted and allowed to connect
    Admitted,
    /// Removed by the host; permanent for the session's lifetime
    Revoked,
}

/// Per-session membership ledger
///
/// Revocation is a one-way door: once revoked, an identity stays revoked
/// no matter how often it re-registers.
#[derive(Debug, Default)]
pub struct ModerationLedger {
    members: HashMap<String, Membership>,
}

impl ModerationLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an admitted viewer. No-op for a revoked identity.
    pub fn admit(&mut self, viewer_id: &str) {
        self.members
            .entry(viewer_id.to_string())
            .or_insert(Membership::Admitted);
    }

    /// Revoke a viewer's membership
    pub fn revoke(&mut self, viewer_id: &str) {
        self.members
            .insert(viewer_id.to_string(), Membership::Revoked);
    }

    /// Current standing of an identity, if it ever registered
    pub fn membership(&self, viewer_id: &str) -> Option<Membership> {
        self.members.get(viewer_id).copied()
    }

    /// Whether an identity has been revoked
    pub fn is_revoked(&self, viewer_id: &str) -> bool {
        self.membership(viewer_id) == Some(Membership::Revoked)
    }
}

/// Decide whether `viewer_id` may join the given session
///
/// Join is allowed only into a live broadcast, and never for a revoked
/// identity.
pub fn check_join(
    record: &SessionRecord,
    ledger: &ModerationLedger,
    viewer_id: &str,
) -> Result<()> {
    if record.kind != SessionKind::Broadcast {
        return Err(Error::Admission(format!(
            "session {} is not a broadcast",
            record.id
        )));
    }
    if record.status != SessionStatus::Active {
        return Err(Error::Admission(format!("session {} is not live", record.id)));
    }
    if ledger.is_revoked(viewer_id) {
        return Err(Error::Admission(format!(
            "viewer {} was removed from session {}",
            viewer_id, record.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcast(status: SessionStatus) -> SessionRecord {
        SessionRecord {
            id: "s1".to_string(),
            kind: SessionKind::Broadcast,
            host_id: "host".to_string(),
            status,
        }
    }

    #[test]
    fn test_join_live_broadcast_allowed() {
        let ledger = ModerationLedger::new();
        assert!(check_join(&broadcast(SessionStatus::Active), &ledger, "v1").is_ok());
    }

    #[test]
    fn test_join_non_broadcast_refused() {
        let record = SessionRecord {
            kind: SessionKind::VideoCall,
            ..broadcast(SessionStatus::Active)
        };
        let ledger = ModerationLedger::new();
        assert!(check_join(&record, &ledger, "v1")
            .unwrap_err()
            .is_admission());
    }

    #[test]
    fn test_join_ended_broadcast_refused() {
        let ledger = ModerationLedger::new();
        assert!(check_join(&broadcast(SessionStatus::Ended), &ledger, "v1")
            .unwrap_err()
            .is_admission());
    }

    #[test]
    fn test_revocation_is_permanent() {
        let mut ledger = ModerationLedger::new();
        ledger.admit("v1");
        ledger.revoke("v1");
        // Re-admitting never clears a revocation
        ledger.admit("v1");

        assert!(ledger.is_revoked("v1"));
        assert!(check_join(&broadcast(SessionStatus::Active), &ledger, "v1")
            .unwrap_err()
            .is_admission());
    }

    #[test]
    fn test_unknown_identity_has_no_membership() {
        let ledger = ModerationLedger::new();
        assert_eq!(ledger.membership("ghost"), None);
        assert!(!ledger.is_revoked("ghost"));
    }
}
