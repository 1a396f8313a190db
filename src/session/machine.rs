//! Session machine driving one call or broadcast end to end
//!
//! One machine owns the local capture stream, the per-remote connection
//! handles, and the signal loop for a single session. Teardown is funneled
//! through a single trigger so that hang-up, kick, timer expiry, and
//! remote closure all converge on the same idempotent cleanup path.

use crate::config::CallConfig;
use crate::media::{LocalMediaStream, MediaProfile, MediaSource};
use crate::peer::{
    ConnectionHandle, ConnectionRegistry, LinkState, NegotiationRole, PeerTransportFactory,
    TransportEvent,
};
use crate::session::events::SessionEvent;
use crate::session::state::{EndReason, SessionPhase, SessionRole};
use crate::signaling::{
    CandidateInit, Invitation, SessionKind, SessionStatus, Signal, SignalBody, SignalSubscription,
    SignalingChannel,
};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// Consecutive status-poll failures tolerated before the channel is
// declared unusable.
const MAX_POLL_FAILURES: u32 = 3;

/// Drives one session from setup to teardown
pub struct SessionMachine {
    session_id: String,
    role: SessionRole,
    local_id: String,
    config: CallConfig,
    channel: Arc<dyn SignalingChannel>,
    factory: Arc<dyn PeerTransportFactory>,
    stream: Arc<LocalMediaStream>,
    registry: ConnectionRegistry,
    phase: RwLock<SessionPhase>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    ended: AtomicBool,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    grace_timers: Mutex<HashMap<String, JoinHandle<()>>>,
    ring_timer: Mutex<Option<JoinHandle<()>>>,
    /// Candidates that arrived before any handle existed for their sender
    early_candidates: Mutex<HashMap<String, Vec<CandidateInit>>>,
    /// Viewers removed by this host; offers from them are ignored even if
    /// the channel redelivers signals published before the removal
    revoked: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for SessionMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMachine")
            .field("session_id", &self.session_id)
            .field("role", &self.role)
            .field("local_id", &self.local_id)
            .finish_non_exhaustive()
    }
}

impl SessionMachine {
    fn build(
        session_id: String,
        role: SessionRole,
        local_id: String,
        config: CallConfig,
        channel: Arc<dyn SignalingChannel>,
        factory: Arc<dyn PeerTransportFactory>,
        stream: LocalMediaStream,
        phase: SessionPhase,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(false);
        let machine = Arc::new(Self {
            session_id,
            role,
            local_id,
            config,
            channel,
            factory,
            stream: Arc::new(stream),
            registry: ConnectionRegistry::new(),
            phase: RwLock::new(phase),
            events_tx,
            ended: AtomicBool::new(false),
            done_tx,
            done_rx,
            tasks: Mutex::new(Vec::new()),
            grace_timers: Mutex::new(HashMap::new()),
            ring_timer: Mutex::new(None),
            early_candidates: Mutex::new(HashMap::new()),
            revoked: Mutex::new(HashSet::new()),
        });
        (machine, events_rx)
    }

    /// Place a 1:1 call to `callee_id`.
    ///
    /// Capture runs first: a media failure surfaces here and no session
    /// record is ever created. The machine then rings until the callee's
    /// offer arrives or the ring timeout fires.
    pub async fn start_call(
        channel: Arc<dyn SignalingChannel>,
        factory: Arc<dyn PeerTransportFactory>,
        source: &dyn MediaSource,
        config: CallConfig,
        local_id: &str,
        callee_id: &str,
        kind: SessionKind,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>)> {
        if !kind.is_call() {
            return Err(Error::InvalidConfig(
                "start_call requires a call session kind".to_string(),
            ));
        }
        let stream = source
            .capture(MediaProfile {
                video: kind.has_video(),
            })
            .await?;

        let record = channel
            .create_session(kind, local_id, Some(callee_id))
            .await?;
        let subscription = channel.subscribe_signals(&record.id, local_id).await?;

        info!(session_id = %record.id, callee_id, kind = ?kind, "Call placed");
        let (machine, events_rx) = Self::build(
            record.id,
            SessionRole::Caller,
            local_id.to_string(),
            config,
            channel,
            factory,
            stream,
            SessionPhase::Ringing,
        );

        machine.emit(SessionEvent::Ringing(Invitation {
            session_id: machine.session_id.clone(),
            kind,
            from: local_id.to_string(),
            to: callee_id.to_string(),
        }));

        machine.spawn_signal_loop(subscription).await;
        machine.spawn_status_poll().await;
        machine.spawn_ring_timer().await;
        Ok((machine, events_rx))
    }

    /// Pick up an incoming call.
    ///
    /// The callee captures media, then initiates the offer toward the
    /// caller; the side answering a ring is always the one that offers,
    /// so the two parties can never offer simultaneously.
    pub async fn accept(
        channel: Arc<dyn SignalingChannel>,
        factory: Arc<dyn PeerTransportFactory>,
        source: &dyn MediaSource,
        config: CallConfig,
        local_id: &str,
        invitation: &Invitation,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>)> {
        let stream = source
            .capture(MediaProfile {
                video: invitation.kind.has_video(),
            })
            .await?;
        let subscription = channel
            .subscribe_signals(&invitation.session_id, local_id)
            .await?;

        let (machine, events_rx) = Self::build(
            invitation.session_id.clone(),
            SessionRole::Callee,
            local_id.to_string(),
            config,
            channel,
            factory,
            stream,
            SessionPhase::Connecting,
        );
        machine.emit(SessionEvent::Connecting);
        info!(session_id = %machine.session_id, caller = %invitation.from, "Call accepted");

        if let Err(e) = machine.initiate_toward(&invitation.from).await {
            machine.stream.stop_all();
            return Err(e);
        }
        machine.spawn_signal_loop(subscription).await;
        machine.spawn_status_poll().await;
        Ok((machine, events_rx))
    }

    /// Decline an incoming call without building a machine.
    ///
    /// Ends the session record; the caller observes the closure through
    /// its status poll while still ringing and reports a rejection.
    pub async fn reject(
        channel: &Arc<dyn SignalingChannel>,
        invitation: &Invitation,
    ) -> Result<()> {
        info!(session_id = %invitation.session_id, "Call rejected");
        channel.end_session(&invitation.session_id).await
    }

    /// Start hosting a broadcast.
    ///
    /// The host is live immediately; viewers connect one by one and each
    /// viewer's offer is answered independently.
    pub async fn start_broadcast(
        channel: Arc<dyn SignalingChannel>,
        factory: Arc<dyn PeerTransportFactory>,
        source: &dyn MediaSource,
        config: CallConfig,
        local_id: &str,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>)> {
        let stream = source.capture(MediaProfile { video: true }).await?;
        let record = channel
            .create_session(SessionKind::Broadcast, local_id, None)
            .await?;
        let subscription = channel.subscribe_signals(&record.id, local_id).await?;

        info!(session_id = %record.id, host_id = local_id, "Broadcast started");
        let (machine, events_rx) = Self::build(
            record.id,
            SessionRole::BroadcastHost,
            local_id.to_string(),
            config,
            channel,
            factory,
            stream,
            SessionPhase::Active,
        );
        machine.emit(SessionEvent::Connecting);
        machine.emit(SessionEvent::Active);

        machine.spawn_signal_loop(subscription).await;
        machine.spawn_status_poll().await;
        Ok((machine, events_rx))
    }

    /// Join a broadcast as a viewer.
    ///
    /// Admission runs before anything else: a refused registration
    /// surfaces as [`Error::Admission`] and no machine is created.
    pub async fn join_broadcast(
        channel: Arc<dyn SignalingChannel>,
        factory: Arc<dyn PeerTransportFactory>,
        source: &dyn MediaSource,
        config: CallConfig,
        local_id: &str,
        session_id: &str,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>)> {
        channel.register_viewer(session_id, local_id).await?;
        let record = channel.get_session(session_id).await?;
        let stream = source.capture(MediaProfile { video: true }).await?;
        let subscription = channel.subscribe_signals(session_id, local_id).await?;

        let (machine, events_rx) = Self::build(
            session_id.to_string(),
            SessionRole::BroadcastViewer,
            local_id.to_string(),
            config,
            channel,
            factory,
            stream,
            SessionPhase::Connecting,
        );
        machine.emit(SessionEvent::Connecting);
        info!(session_id, host_id = %record.host_id, "Joined broadcast");

        if let Err(e) = machine.initiate_toward(&record.host_id).await {
            machine.stream.stop_all();
            return Err(e);
        }
        machine.spawn_signal_loop(subscription).await;
        machine.spawn_status_poll().await;
        Ok((machine, events_rx))
    }

    /// The session this machine drives
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// This participant's role
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Current lifecycle phase
    pub async fn phase(&self) -> SessionPhase {
        *self.phase.read().await
    }

    /// Number of live remote connections
    pub async fn connection_count(&self) -> usize {
        self.registry.count().await
    }

    /// Whether teardown has been triggered
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Mute or unmute the microphone in place.
    ///
    /// Valid while negotiating or active; a no-op in any other phase.
    pub async fn set_muted(&self, muted: bool) {
        if self.toggles_allowed().await {
            self.stream.set_audio_enabled(!muted);
        }
    }

    /// Enable or disable the camera in place.
    ///
    /// Valid while negotiating or active; a no-op in any other phase.
    pub async fn set_video_enabled(&self, enabled: bool) {
        if self.toggles_allowed().await {
            self.stream.set_video_enabled(enabled);
        }
    }

    async fn toggles_allowed(&self) -> bool {
        matches!(
            self.phase().await,
            SessionPhase::Connecting | SessionPhase::Active
        )
    }

    /// The local capture stream
    pub fn stream(&self) -> &Arc<LocalMediaStream> {
        &self.stream
    }

    /// Remove a viewer from the broadcast. Host only.
    ///
    /// The revocation is recorded before the removal signal is published,
    /// so a redelivered offer from the viewer can never be answered after
    /// this returns.
    pub async fn kick(&self, viewer_id: &str) -> Result<()> {
        if self.role != SessionRole::BroadcastHost {
            return Err(Error::InvalidState(
                "only the broadcast host removes viewers".to_string(),
            ));
        }
        self.revoked.lock().await.insert(viewer_id.to_string());
        self.channel
            .revoke_viewer(&self.session_id, viewer_id)
            .await?;
        self.channel
            .publish_signal(
                &self.session_id,
                Signal::kicked(&self.local_id, viewer_id),
            )
            .await?;
        self.registry.remove(viewer_id).await;
        info!(session_id = %self.session_id, viewer_id, "Viewer removed");
        Ok(())
    }

    /// Hang up and wait for teardown to finish. Idempotent.
    pub async fn hang_up(self: &Arc<Self>) {
        self.trigger_end(EndReason::HungUp);
        self.wait_ended().await;
    }

    /// Trigger teardown without waiting.
    ///
    /// The first trigger wins; every later call, whatever its reason, is
    /// a no-op. Safe to call from inside the machine's own tasks.
    pub fn trigger_end(self: &Arc<Self>, reason: EndReason) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let machine = Arc::clone(self);
        tokio::spawn(async move {
            machine.cleanup(reason).await;
        });
    }

    /// Wait until teardown has completed
    pub async fn wait_ended(&self) {
        let mut done = self.done_rx.clone();
        while !*done.borrow() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }

    async fn cleanup(self: Arc<Self>, reason: EndReason) {
        info!(session_id = %self.session_id, reason = %reason, "Session ending");
        *self.phase.write().await = SessionPhase::Ended;

        self.stream.stop_all();
        self.registry.clear().await;

        if self.role.has_authority() {
            if let Err(e) = self.channel.end_session(&self.session_id).await {
                warn!(session_id = %self.session_id, error = %e, "Failed to close session record");
            }
        }

        self.emit(SessionEvent::Ended(reason));
        let _ = self.done_tx.send(true);

        // Abort our own tasks last; cleanup itself runs detached.
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        for (_, task) in self.grace_timers.lock().await.drain() {
            task.abort();
        }
        if let Some(task) = self.ring_timer.lock().await.take() {
            task.abort();
        }
    }

    fn emit(&self, event: SessionEvent) {
        debug!(session_id = %self.session_id, event = event.kind(), "Event");
        let _ = self.events_tx.send(event);
    }

    async fn transition(&self, next: SessionPhase) -> bool {
        let mut phase = self.phase.write().await;
        if *phase == next {
            return false;
        }
        if !phase.can_transition(next) {
            warn!(
                session_id = %self.session_id,
                from = %*phase,
                to = %next,
                "Ignoring illegal phase transition"
            );
            return false;
        }
        debug!(session_id = %self.session_id, from = %*phase, to = %next, "Phase transition");
        *phase = next;
        true
    }

    /// Create the initiator-side handle toward `remote_id` and publish
    /// the offer
    async fn initiate_toward(self: &Arc<Self>, remote_id: &str) -> Result<()> {
        let handle = self
            .create_handle(remote_id, NegotiationRole::Initiator)
            .await?;
        let offer = handle.initiate().await?;
        self.registry.insert(handle).await;
        self.channel
            .publish_signal(
                &self.session_id,
                Signal::offer(&self.local_id, remote_id, offer),
            )
            .await?;
        Ok(())
    }

    async fn create_handle(
        self: &Arc<Self>,
        remote_id: &str,
        role: NegotiationRole,
    ) -> Result<Arc<ConnectionHandle>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = self.factory.create(remote_id, &self.stream, tx).await?;
        let handle = Arc::new(ConnectionHandle::new(remote_id, role, transport));
        self.spawn_transport_loop(remote_id.to_string(), rx).await;
        Ok(handle)
    }

    async fn spawn_signal_loop(self: &Arc<Self>, mut subscription: SignalSubscription) {
        let machine = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(signal) = subscription.recv().await {
                if machine.is_ended() {
                    break;
                }
                if signal.from == machine.local_id {
                    continue;
                }
                let kind = signal.kind();
                let from = signal.from.clone();
                if let Err(e) = machine.handle_signal(signal).await {
                    warn!(
                        session_id = %machine.session_id,
                        from = %from,
                        kind,
                        error = %e,
                        "Failed to handle signal"
                    );
                    // A failed exchange step is fatal for this session.
                    // A host keeps going; it still serves the other
                    // viewers.
                    if machine.role != SessionRole::BroadcastHost {
                        let reason = if e.is_negotiation() {
                            EndReason::NegotiationFailed
                        } else {
                            EndReason::ChannelFailed
                        };
                        machine.trigger_end(reason);
                    }
                }
            }
            if !machine.is_ended() {
                machine.trigger_end(EndReason::ChannelFailed);
            }
        });
        self.tasks.lock().await.push(task);
    }

    async fn handle_signal(self: &Arc<Self>, signal: Signal) -> Result<()> {
        debug!(
            session_id = %self.session_id,
            from = %signal.from,
            seq = signal.seq,
            kind = signal.kind(),
            "Signal received"
        );
        match signal.body {
            SignalBody::Offer { sdp } => self.handle_offer(&signal.from, &sdp).await,
            SignalBody::Answer { sdp } => self.handle_answer(&signal.from, &sdp).await,
            SignalBody::Candidate(candidate) => {
                self.handle_candidate(&signal.from, candidate).await
            }
            SignalBody::Kicked => {
                info!(session_id = %self.session_id, "Removed by host");
                self.trigger_end(EndReason::Removed);
                Ok(())
            }
        }
    }

    async fn handle_offer(self: &Arc<Self>, from: &str, sdp: &str) -> Result<()> {
        match self.role {
            SessionRole::Caller | SessionRole::BroadcastHost => {}
            _ => {
                warn!(session_id = %self.session_id, from, "Ignoring unexpected offer");
                return Ok(());
            }
        }
        if self.role.is_host() && self.revoked.lock().await.contains(from) {
            info!(session_id = %self.session_id, from, "Ignoring offer from removed viewer");
            return Ok(());
        }

        if let Some(existing) = self.registry.get(from).await {
            // A redelivered offer for a live handle is a duplicate, not a
            // renegotiation.
            if let Some(answer) = existing.respond(sdp).await? {
                self.channel
                    .publish_signal(
                        &self.session_id,
                        Signal::answer(&self.local_id, from, answer),
                    )
                    .await?;
            }
            return Ok(());
        }

        if let Some(task) = self.ring_timer.lock().await.take() {
            task.abort();
        }
        // Leave Ringing before negotiating so a fast link-state report
        // cannot observe a pre-Connecting phase.
        if self.role == SessionRole::Caller && self.transition(SessionPhase::Connecting).await {
            self.emit(SessionEvent::Connecting);
        }

        let handle = self.create_handle(from, NegotiationRole::Responder).await?;
        let early = self.early_candidates.lock().await.remove(from);
        if let Some(candidates) = early {
            for candidate in candidates {
                handle.add_candidate(candidate).await?;
            }
        }
        let answer = match handle.respond(sdp).await? {
            Some(answer) => answer,
            None => return Ok(()),
        };
        self.registry.insert(handle).await;
        self.channel
            .publish_signal(
                &self.session_id,
                Signal::answer(&self.local_id, from, answer),
            )
            .await?;
        Ok(())
    }

    async fn handle_answer(&self, from: &str, sdp: &str) -> Result<()> {
        match self.registry.get(from).await {
            Some(handle) => {
                handle.apply_answer(sdp).await?;
                Ok(())
            }
            None => {
                warn!(session_id = %self.session_id, from, "Answer without a connection");
                Ok(())
            }
        }
    }

    async fn handle_candidate(&self, from: &str, candidate: CandidateInit) -> Result<()> {
        match self.registry.get(from).await {
            Some(handle) => handle.add_candidate(candidate).await,
            None => {
                // No handle yet for this remote; hold the candidate until
                // its offer arrives.
                self.early_candidates
                    .lock()
                    .await
                    .entry(from.to_string())
                    .or_default()
                    .push(candidate);
                Ok(())
            }
        }
    }

    async fn spawn_transport_loop(
        self: &Arc<Self>,
        remote_id: String,
        mut rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let machine = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if machine.is_ended() {
                    break;
                }
                machine.handle_transport_event(&remote_id, event).await;
            }
        });
        self.tasks.lock().await.push(task);
    }

    async fn handle_transport_event(self: &Arc<Self>, remote_id: &str, event: TransportEvent) {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                let signal = Signal::candidate(&self.local_id, remote_id, candidate);
                if let Err(e) = self.channel.publish_signal(&self.session_id, signal).await {
                    warn!(
                        session_id = %self.session_id,
                        remote_id,
                        error = %e,
                        "Failed to publish candidate"
                    );
                    if !self.role.is_host() {
                        self.trigger_end(EndReason::ChannelFailed);
                    }
                }
            }
            TransportEvent::LinkState(state) => {
                if let Some(handle) = self.registry.get(remote_id).await {
                    handle.set_link_state(state).await;
                }
                self.handle_link_state(remote_id, state).await;
            }
        }
    }

    async fn handle_link_state(self: &Arc<Self>, remote_id: &str, state: LinkState) {
        debug!(session_id = %self.session_id, remote_id, state = %state, "Link state");
        match state {
            LinkState::Connected => {
                if let Some(task) = self.grace_timers.lock().await.remove(remote_id) {
                    task.abort();
                }
                if self.transition(SessionPhase::Active).await {
                    self.emit(SessionEvent::Active);
                }
            }
            LinkState::Disconnected => {
                self.emit(SessionEvent::QualityDegraded {
                    remote_id: remote_id.to_string(),
                });
                self.start_grace_timer(remote_id.to_string()).await;
            }
            LinkState::Failed => {
                if self.role.is_host() {
                    // One viewer failing never takes the broadcast down.
                    self.registry.remove(remote_id).await;
                } else {
                    self.trigger_end(EndReason::ConnectionLost);
                }
            }
            LinkState::New | LinkState::Connecting | LinkState::Closed => {}
        }
    }

    async fn start_grace_timer(self: &Arc<Self>, remote_id: String) {
        let machine = Arc::clone(self);
        let remote = remote_id.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(machine.config.disconnect_grace()).await;
            let still_down = match machine.registry.get(&remote).await {
                Some(handle) => handle.link_state().await == LinkState::Disconnected,
                None => false,
            };
            if !still_down || machine.is_ended() {
                return;
            }
            info!(
                session_id = %machine.session_id,
                remote_id = %remote,
                "Grace period expired"
            );
            if machine.role.is_host() {
                machine.registry.remove(&remote).await;
            } else {
                machine.trigger_end(EndReason::ConnectionLost);
            }
        });
        if let Some(previous) = self.grace_timers.lock().await.insert(remote_id, task) {
            previous.abort();
        }
    }

    async fn spawn_status_poll(self: &Arc<Self>) {
        let machine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut failures: u32 = 0;
            loop {
                tokio::time::sleep(machine.config.status_poll_interval()).await;
                if machine.is_ended() {
                    break;
                }
                match machine.channel.get_session(&machine.session_id).await {
                    Ok(record) => {
                        failures = 0;
                        if record.status == SessionStatus::Ended {
                            let reason = if machine.phase().await == SessionPhase::Ringing {
                                EndReason::Rejected
                            } else {
                                EndReason::SessionClosed
                            };
                            machine.trigger_end(reason);
                            break;
                        }
                    }
                    Err(Error::SessionNotFound(_)) => {
                        machine.trigger_end(EndReason::SessionClosed);
                        break;
                    }
                    Err(e) => {
                        failures += 1;
                        warn!(
                            session_id = %machine.session_id,
                            error = %e,
                            failures,
                            "Status poll failed"
                        );
                        if failures >= MAX_POLL_FAILURES {
                            machine.trigger_end(EndReason::ChannelFailed);
                            break;
                        }
                    }
                }
            }
        });
        self.tasks.lock().await.push(task);
    }

    async fn spawn_ring_timer(self: &Arc<Self>) {
        let machine = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(machine.config.ring_timeout()).await;
            if machine.phase().await == SessionPhase::Ringing {
                info!(session_id = %machine.session_id, "Ring timeout");
                machine.trigger_end(EndReason::NoAnswer);
            }
        });
        *self.ring_timer.lock().await = Some(task);
    }
}
