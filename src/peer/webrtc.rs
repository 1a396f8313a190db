//! Production transport over the webrtc engine

use crate::config::CallConfig;
use crate::media::LocalMediaStream;
use crate::peer::transport::{LinkState, PeerTransport, PeerTransportFactory, TransportEvent};
use crate::signaling::CandidateInit;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;

/// Transport backed by a real `RTCPeerConnection`
pub struct WebRtcTransport {
    remote_id: String,
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcTransport {
    async fn new(
        config: &CallConfig,
        remote_id: &str,
        stream: &LocalMediaStream,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnection(format!("Failed to register codecs: {e}")))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| Error::PeerConnection(format!("Failed to register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let mut ice_servers: Vec<RTCIceServer> = vec![RTCIceServer {
            urls: config.stun_servers.clone(),
            ..Default::default()
        }];
        for turn in &config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![turn.url.clone()],
                username: turn.username.clone(),
                credential: turn.credential.clone(),
            });
        }

        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::PeerConnection(format!("Failed to create connection: {e}")))?,
        );

        // Attach the local stream before negotiation so the tracks land in
        // the initial offer/answer.
        pc.add_track(Arc::clone(stream.audio().rtp()) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::Media(format!("Failed to attach audio track: {e}")))?;
        if let Some(video) = stream.video() {
            pc.add_track(Arc::clone(video.rtp()) as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| Error::Media(format!("Failed to attach video track: {e}")))?;
        }

        let candidate_tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let candidate_tx = candidate_tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = candidate_tx.send(TransportEvent::LocalCandidate(CandidateInit {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }));
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize local candidate"),
                }
            })
        }));

        let state_tx = events;
        let remote = remote_id.to_string();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let state_tx = state_tx.clone();
            let remote = remote.clone();
            Box::pin(async move {
                debug!(remote_id = %remote, state = %state, "Connection state changed");
                let link = match state {
                    RTCPeerConnectionState::New => LinkState::New,
                    RTCPeerConnectionState::Connecting => LinkState::Connecting,
                    RTCPeerConnectionState::Connected => LinkState::Connected,
                    RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
                    RTCPeerConnectionState::Failed => LinkState::Failed,
                    RTCPeerConnectionState::Closed => LinkState::Closed,
                    _ => return,
                };
                let _ = state_tx.send(TransportEvent::LinkState(link));
            })
        }));

        Ok(Self {
            remote_id: remote_id.to_string(),
            pc,
        })
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create offer: {e}")))?;
        let sdp = offer.sdp.clone();
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local offer: {e}")))?;
        debug!(remote_id = %self.remote_id, "Created offer");
        Ok(sdp)
    }

    async fn create_answer(&self, offer_sdp: &str) -> Result<String> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| Error::Sdp(format!("Invalid remote offer: {e}")))?;
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set remote offer: {e}")))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create answer: {e}")))?;
        let sdp = answer.sdp.clone();
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local answer: {e}")))?;
        debug!(remote_id = %self.remote_id, "Created answer");
        Ok(sdp)
    }

    async fn apply_answer(&self, answer_sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(answer_sdp.to_string())
            .map_err(|e| Error::Sdp(format!("Invalid remote answer: {e}")))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set remote answer: {e}")))?;
        debug!(remote_id = %self.remote_id, "Applied answer");
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: CandidateInit) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await
            .map_err(|e| Error::IceCandidate(format!("Failed to add candidate: {e}")))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| Error::PeerConnection(format!("Failed to close connection: {e}")))?;
        debug!(remote_id = %self.remote_id, "Transport closed");
        Ok(())
    }
}

/// Factory producing [`WebRtcTransport`] instances from one shared config
pub struct WebRtcTransportFactory {
    config: CallConfig,
}

impl WebRtcTransportFactory {
    /// Create a factory for the given ICE configuration
    pub fn new(config: CallConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PeerTransportFactory for WebRtcTransportFactory {
    async fn create(
        &self,
        remote_id: &str,
        stream: &LocalMediaStream,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn PeerTransport>> {
        let transport = WebRtcTransport::new(&self.config, remote_id, stream, events).await?;
        Ok(Arc::new(transport))
    }
}
