//! Incoming-call watcher
//!
//! Polls the signaling channel for invitations addressed to the local
//! identity and surfaces each one exactly once. Surfacing pauses the
//! watcher so a second invitation cannot interrupt the user while the
//! first is still being decided.

use crate::config::CallConfig;
use crate::signaling::{Invitation, SignalingChannel};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct WatcherState {
    paused: AtomicBool,
    /// Sessions already surfaced, so a still-pending invitation is not
    /// surfaced again after a resume
    surfaced: Mutex<HashSet<String>>,
}

/// Watches for incoming call invitations
pub struct IncomingCallWatcher {
    state: Arc<WatcherState>,
    task: JoinHandle<()>,
}

impl IncomingCallWatcher {
    /// Start watching for invitations addressed to `local_id`.
    ///
    /// Each invitation is delivered once on the returned receiver; the
    /// watcher auto-pauses after surfacing and must be resumed once the
    /// invitation has been accepted or rejected.
    pub fn spawn(
        channel: Arc<dyn SignalingChannel>,
        config: &CallConfig,
        local_id: &str,
    ) -> (Self, mpsc::UnboundedReceiver<Invitation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(WatcherState {
            paused: AtomicBool::new(false),
            surfaced: Mutex::new(HashSet::new()),
        });

        let poll_interval = config.watcher_poll_interval();
        let local_id = local_id.to_string();
        let watcher_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            info!(local_id = %local_id, "Watching for incoming calls");
            loop {
                tokio::time::sleep(poll_interval).await;
                if watcher_state.paused.load(Ordering::SeqCst) {
                    continue;
                }
                let invitations = match channel.pending_invitations(&local_id).await {
                    Ok(invitations) => invitations,
                    Err(e) => {
                        warn!(error = %e, "Invitation poll failed");
                        continue;
                    }
                };

                let mut surfaced = watcher_state.surfaced.lock().await;
                let Some(invitation) = invitations
                    .into_iter()
                    .find(|i| !surfaced.contains(&i.session_id))
                else {
                    continue;
                };
                surfaced.insert(invitation.session_id.clone());
                // Pause before handing the invitation out so a fast poll
                // cannot surface a second one mid-decision.
                watcher_state.paused.store(true, Ordering::SeqCst);
                debug!(session_id = %invitation.session_id, from = %invitation.from, "Incoming call");
                if tx.send(invitation).is_err() {
                    break;
                }
            }
        });

        (Self { state, task }, rx)
    }

    /// Stop surfacing invitations until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    /// Resume surfacing invitations
    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    /// Whether the watcher is currently paused
    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    /// Stop the watcher for good
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for IncomingCallWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{InMemoryChannel, SessionKind};
    use std::time::Duration;

    fn fast_config() -> CallConfig {
        CallConfig {
            watcher_poll_interval_ms: 10,
            ..CallConfig::default()
        }
    }

    async fn recv_invitation(
        rx: &mut mpsc::UnboundedReceiver<Invitation>,
    ) -> Option<Invitation> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_surfaces_invitation_once_and_pauses() {
        let channel = Arc::new(InMemoryChannel::new());
        let record = channel
            .create_session(SessionKind::VideoCall, "alice", Some("bob"))
            .await
            .unwrap();

        let (watcher, mut rx) =
            IncomingCallWatcher::spawn(channel.clone(), &fast_config(), "bob");

        let invitation = recv_invitation(&mut rx).await.unwrap();
        assert_eq!(invitation.session_id, record.id);
        assert_eq!(invitation.from, "alice");
        assert!(watcher.is_paused());
    }

    #[tokio::test]
    async fn test_resume_does_not_resurface_same_session() {
        let channel = Arc::new(InMemoryChannel::new());
        channel
            .create_session(SessionKind::VoiceCall, "alice", Some("bob"))
            .await
            .unwrap();

        let (watcher, mut rx) =
            IncomingCallWatcher::spawn(channel.clone(), &fast_config(), "bob");

        recv_invitation(&mut rx).await.unwrap();
        watcher.resume();

        // The same pending session stays quiet; a new one surfaces.
        let second = channel
            .create_session(SessionKind::VoiceCall, "carol", Some("bob"))
            .await
            .unwrap();
        let invitation = recv_invitation(&mut rx).await.unwrap();
        assert_eq!(invitation.session_id, second.id);
    }

    #[tokio::test]
    async fn test_paused_watcher_stays_quiet() {
        let channel = Arc::new(InMemoryChannel::new());
        let (watcher, mut rx) =
            IncomingCallWatcher::spawn(channel.clone(), &fast_config(), "bob");
        watcher.pause();

        channel
            .create_session(SessionKind::VideoCall, "alice", Some("bob"))
            .await
            .unwrap();

        let quiet = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(quiet.is_err());

        watcher.resume();
        assert!(recv_invitation(&mut rx).await.is_some());
    }

    #[tokio::test]
    async fn test_stop_ends_delivery() {
        let channel = Arc::new(InMemoryChannel::new());
        let (watcher, mut rx) =
            IncomingCallWatcher::spawn(channel.clone(), &fast_config(), "bob");
        watcher.stop();

        channel
            .create_session(SessionKind::VideoCall, "alice", Some("bob"))
            .await
            .unwrap();
        assert!(rx.recv().await.is_none());
    }
}
