//! Shared harness for the integration tests: scripted transports and
//! event helpers.

// Each integration binary uses a different slice of this module.
#![allow(dead_code)]

use async_trait::async_trait;
use peercall::media::LocalMediaStream;
use peercall::peer::{LinkState, PeerTransport, PeerTransportFactory, TransportEvent};
use peercall::session::{EndReason, SessionEvent};
use peercall::signaling::CandidateInit;
use peercall::{CallConfig, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use std::time::Duration;

/// Install a test subscriber once per process
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peercall=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Timings tight enough that timeout paths finish inside a test
pub fn test_config() -> CallConfig {
    CallConfig {
        ring_timeout_ms: 300,
        disconnect_grace_ms: 100,
        watcher_poll_interval_ms: 20,
        status_poll_interval_ms: 20,
        ..CallConfig::default()
    }
}

/// Scripted behavior of a [`MockTransport`]
#[derive(Clone, Debug)]
pub struct MockBehavior {
    /// Report Connecting/Connected as soon as negotiation completes
    pub connect_on_negotiation: bool,
    /// Report Connected only after this many remote candidates applied
    pub connect_after_candidates: Option<usize>,
    /// Fail offer creation
    pub fail_offer: bool,
    /// Fail answer creation/application
    pub fail_answer: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            connect_on_negotiation: true,
            connect_after_candidates: None,
            fail_offer: false,
            fail_answer: false,
        }
    }
}

/// In-process transport that negotiates with fake SDP and reports link
/// states on cue
#[derive(Debug)]
pub struct MockTransport {
    remote_id: String,
    behavior: MockBehavior,
    events: mpsc::UnboundedSender<TransportEvent>,
    negotiated: AtomicBool,
    pub offers: AtomicUsize,
    pub answers_created: AtomicUsize,
    pub answers_applied: AtomicUsize,
    pub candidates_applied: AtomicUsize,
    pub closed: AtomicBool,
}

impl MockTransport {
    fn new(
        remote_id: &str,
        behavior: MockBehavior,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            remote_id: remote_id.to_string(),
            behavior,
            events,
            negotiated: AtomicBool::new(false),
            offers: AtomicUsize::new(0),
            answers_created: AtomicUsize::new(0),
            answers_applied: AtomicUsize::new(0),
            candidates_applied: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Script a link-state report, e.g. a mid-call disconnect
    pub fn emit_link(&self, state: LinkState) {
        let _ = self.events.send(TransportEvent::LinkState(state));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn negotiation_done(&self) {
        self.negotiated.store(true, Ordering::SeqCst);
        if self.behavior.connect_on_negotiation && self.behavior.connect_after_candidates.is_none()
        {
            self.emit_link(LinkState::Connecting);
            self.emit_link(LinkState::Connected);
        }
    }

    fn candidate_applied(&self) {
        let applied = self.candidates_applied.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(needed) = self.behavior.connect_after_candidates {
            if applied >= needed && self.negotiated.load(Ordering::SeqCst) {
                self.emit_link(LinkState::Connecting);
                self.emit_link(LinkState::Connected);
            }
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self) -> Result<String> {
        if self.behavior.fail_offer {
            return Err(peercall::Error::Sdp("scripted offer failure".into()));
        }
        self.offers.fetch_add(1, Ordering::SeqCst);
        Ok(format!("offer-for-{}", self.remote_id))
    }

    async fn create_answer(&self, _offer_sdp: &str) -> Result<String> {
        if self.behavior.fail_answer {
            return Err(peercall::Error::Sdp("scripted answer failure".into()));
        }
        self.answers_created.fetch_add(1, Ordering::SeqCst);
        self.negotiation_done();
        Ok(format!("answer-for-{}", self.remote_id))
    }

    async fn apply_answer(&self, _answer_sdp: &str) -> Result<()> {
        if self.behavior.fail_answer {
            return Err(peercall::Error::Sdp("scripted answer failure".into()));
        }
        self.answers_applied.fetch_add(1, Ordering::SeqCst);
        self.negotiation_done();
        Ok(())
    }

    async fn add_remote_candidate(&self, _candidate: CandidateInit) -> Result<()> {
        self.candidate_applied();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out [`MockTransport`]s and keeping every one reachable
/// for assertions
#[derive(Debug, Default)]
pub struct MockFactory {
    default_behavior: MockBehavior,
    overrides: Mutex<HashMap<String, MockBehavior>>,
    transports: Mutex<HashMap<String, Vec<Arc<MockTransport>>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            default_behavior: behavior,
            ..Self::default()
        }
    }

    /// Override the behavior used for a specific remote peer
    pub async fn set_behavior_for(&self, remote_id: &str, behavior: MockBehavior) {
        self.overrides
            .lock()
            .await
            .insert(remote_id.to_string(), behavior);
    }

    /// Latest transport created toward `remote_id`
    pub async fn transport_for(&self, remote_id: &str) -> Option<Arc<MockTransport>> {
        self.transports
            .lock()
            .await
            .get(remote_id)
            .and_then(|v| v.last().cloned())
    }

}

#[async_trait]
impl PeerTransportFactory for MockFactory {
    async fn create(
        &self,
        remote_id: &str,
        _stream: &LocalMediaStream,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        let behavior = self
            .overrides
            .lock()
            .await
            .get(remote_id)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone());
        let transport = Arc::new(MockTransport::new(remote_id, behavior, events));
        self.transports
            .lock()
            .await
            .entry(remote_id.to_string())
            .or_default()
            .push(transport.clone());
        Ok(transport)
    }
}

/// Receive the next event or panic after two seconds
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event stream closed")
}

/// Skip events until one matches
pub async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    mut pred: impl FnMut(&SessionEvent) -> bool,
) -> SessionEvent {
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Skip events until the session is active
pub async fn wait_for_active(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) {
    wait_for(rx, |e| matches!(e, SessionEvent::Active)).await;
}

/// Skip events until the session ends, returning the reason
pub async fn wait_for_ended(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> EndReason {
    match wait_for(rx, |e| matches!(e, SessionEvent::Ended(_))).await {
        SessionEvent::Ended(reason) => reason,
        _ => unreachable!(),
    }
}

/// Let in-flight tasks settle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
