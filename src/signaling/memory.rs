//! In-memory signaling channel
//!
//! Reference implementation of [`SignalingChannel`] backed by a per-session
//! append-only log. Used by the integration tests and useful for embedding
//! both ends of a call in one process.

use crate::admission::{check_join, ModerationLedger};
use crate::signaling::channel::{SignalSubscription, SignalingChannel};
use crate::signaling::protocol::{Invitation, SessionKind, SessionRecord, SessionStatus, Signal};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

struct Subscriber {
    identity: String,
    tx: mpsc::UnboundedSender<Signal>,
}

struct SessionEntry {
    record: SessionRecord,
    invitee: Option<String>,
    next_seq: u64,
    log: Vec<Signal>,
    subscribers: Vec<Subscriber>,
    moderation: ModerationLedger,
}

/// In-memory [`SignalingChannel`] implementation
#[derive(Clone, Default)]
pub struct InMemoryChannel {
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl InMemoryChannel {
    /// Create an empty channel
    pub fn new() -> Self {
        Self::default()
    }

    /// Redeliver an already-appended signal to its recipient.
    ///
    /// Simulates the at-least-once delivery of a real channel; the signal
    /// keeps its original `seq`.
    pub async fn redeliver(&self, session_id: &str, seq: u64) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let signal = entry
            .log
            .iter()
            .find(|s| s.seq == seq)
            .cloned()
            .ok_or_else(|| Error::Signaling(format!("no signal with seq {} to redeliver", seq)))?;

        deliver(entry, signal);
        Ok(())
    }

    /// Number of signals appended to a session's log (test observability)
    pub async fn log_len(&self, session_id: &str) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.get(session_id).map(|e| e.log.len()).unwrap_or(0)
    }
}

/// Send to live subscribers matching the recipient, pruning dead ones
fn deliver(entry: &mut SessionEntry, signal: Signal) {
    entry.subscribers.retain(|sub| {
        if sub.identity != signal.to {
            return true;
        }
        sub.tx.send(signal.clone()).is_ok()
    });
}

#[async_trait]
impl SignalingChannel for InMemoryChannel {
    async fn create_session(
        &self,
        kind: SessionKind,
        host_id: &str,
        invitee: Option<&str>,
    ) -> Result<SessionRecord> {
        let record = SessionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            host_id: host_id.to_string(),
            // Broadcasts are live as soon as the host starts them; calls
            // stay pending until terminated.
            status: if kind.is_call() {
                SessionStatus::Pending
            } else {
                SessionStatus::Active
            },
        };

        debug!(
            session_id = %record.id,
            kind = ?kind,
            host_id = %host_id,
            "Creating session"
        );

        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            record.id.clone(),
            SessionEntry {
                record: record.clone(),
                invitee: invitee.map(|s| s.to_string()),
                next_seq: 0,
                log: Vec::new(),
                subscribers: Vec::new(),
                moderation: ModerationLedger::new(),
            },
        );

        Ok(record)
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionRecord> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(session_id)
            .map(|e| e.record.clone())
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    async fn end_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        if entry.record.status != SessionStatus::Ended {
            debug!(session_id = %session_id, "Ending session");
            entry.record.status = SessionStatus::Ended;
        }
        Ok(())
    }

    async fn publish_signal(&self, session_id: &str, mut signal: Signal) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        entry.next_seq += 1;
        signal.seq = entry.next_seq;

        debug!(
            session_id = %session_id,
            kind = signal.kind(),
            from = %signal.from,
            to = %signal.to,
            seq = signal.seq,
            "Publishing signal"
        );

        entry.log.push(signal.clone());
        deliver(entry, signal);
        Ok(())
    }

    async fn subscribe_signals(
        &self,
        session_id: &str,
        local_identity: &str,
    ) -> Result<SignalSubscription> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();

        // Replay what was already appended for this identity so a late
        // subscriber does not miss the start of the exchange.
        for signal in entry.log.iter().filter(|s| s.to == local_identity) {
            if tx.send(signal.clone()).is_err() {
                warn!(session_id = %session_id, "Subscriber dropped during replay");
                break;
            }
        }

        entry.subscribers.push(Subscriber {
            identity: local_identity.to_string(),
            tx,
        });

        Ok(SignalSubscription::new(rx))
    }

    async fn pending_invitations(&self, local_identity: &str) -> Result<Vec<Invitation>> {
        let sessions = self.sessions.lock().await;
        let invitations = sessions
            .values()
            .filter_map(|entry| {
                if entry.record.status != SessionStatus::Pending {
                    return None;
                }
                let invitee = entry.invitee.as_deref()?;
                if invitee != local_identity {
                    return None;
                }
                Some(Invitation {
                    session_id: entry.record.id.clone(),
                    kind: entry.record.kind,
                    from: entry.record.host_id.clone(),
                    to: invitee.to_string(),
                })
            })
            .collect();
        Ok(invitations)
    }

    async fn register_viewer(&self, session_id: &str, viewer_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        check_join(&entry.record, &entry.moderation, viewer_id)?;

        debug!(session_id = %session_id, viewer_id = %viewer_id, "Registering viewer");
        entry.moderation.admit(viewer_id);
        Ok(())
    }

    async fn revoke_viewer(&self, session_id: &str, viewer_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        debug!(session_id = %session_id, viewer_id = %viewer_id, "Revoking viewer");
        entry.moderation.revoke(viewer_id);
        Ok(())
    }
}
