//! Local capture stream and in-place track controls

use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Kind of a local media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Microphone audio
    Audio,
    /// Camera video
    Video,
}

/// What to capture for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaProfile {
    /// Capture a video track alongside audio
    pub video: bool,
}

/// One local capture track
///
/// Enable/disable toggles in place without stopping the track or
/// renegotiating; the capture pipeline consults the flag and sends silence
/// or black frames while disabled.
pub struct MediaTrack {
    kind: TrackKind,
    rtp: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl MediaTrack {
    /// Wrap an RTP-writable track
    pub fn new(kind: TrackKind, rtp: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            kind,
            rtp,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    /// Track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// The underlying RTP track, for attaching to a peer connection
    pub fn rtp(&self) -> &Arc<TrackLocalStaticSample> {
        &self.rtp
    }

    /// Toggle the track in place. Idempotent.
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::SeqCst) != enabled {
            debug!(kind = ?self.kind, enabled, "Track toggled");
        }
    }

    /// Whether the track is currently enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Stop the track, releasing the capture device.
    ///
    /// Returns `true` only on the call that actually stopped it, so a
    /// double stop is observable as a no-op.
    pub fn stop(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::SeqCst);
        if first {
            debug!(kind = ?self.kind, "Track stopped");
        }
        first
    }

    /// Whether the track has been stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// The local capture stream owned by exactly one session at a time
pub struct LocalMediaStream {
    audio: MediaTrack,
    video: Option<MediaTrack>,
}

impl std::fmt::Debug for LocalMediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMediaStream")
            .field("has_video", &self.video.is_some())
            .finish_non_exhaustive()
    }
}

impl LocalMediaStream {
    /// Assemble a stream from captured tracks
    pub fn new(audio: MediaTrack, video: Option<MediaTrack>) -> Self {
        Self { audio, video }
    }

    /// The audio track
    pub fn audio(&self) -> &MediaTrack {
        &self.audio
    }

    /// The video track, when the session kind carries video
    pub fn video(&self) -> Option<&MediaTrack> {
        self.video.as_ref()
    }

    /// Enable or disable the audio track in place
    pub fn set_audio_enabled(&self, enabled: bool) {
        self.audio.set_enabled(enabled);
    }

    /// Enable or disable the video track in place.
    ///
    /// No-op for audio-only streams.
    pub fn set_video_enabled(&self, enabled: bool) {
        if let Some(video) = &self.video {
            video.set_enabled(enabled);
        }
    }

    /// Stop every track. Idempotent.
    pub fn stop_all(&self) {
        if self.audio.stop() {
            info!("Local capture stream released");
        }
        if let Some(video) = &self.video {
            video.stop();
        }
    }

    /// Whether any track is still live
    pub fn is_live(&self) -> bool {
        !self.audio.is_stopped()
            || self.video.as_ref().map(|v| !v.is_stopped()).unwrap_or(false)
    }
}

/// Source of local capture streams
///
/// Device acquisition is asynchronous and may fail with
/// [`Error::Media`] when the device is denied or unavailable;
/// that failure surfaces before any signal is published.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire the local capture stream for the given profile
    async fn capture(&self, profile: MediaProfile) -> Result<LocalMediaStream>;
}

/// Capture source producing sample-writable RTP tracks
///
/// Stands in for platform capture: it allocates the Opus/VP8 local tracks
/// that a device pipeline writes samples into. Creation never touches the
/// network.
#[derive(Debug, Default, Clone)]
pub struct StaticSampleSource;

impl StaticSampleSource {
    /// Create a source
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaSource for StaticSampleSource {
    async fn capture(&self, profile: MediaProfile) -> Result<LocalMediaStream> {
        let stream_id = format!("stream-{}", uuid::Uuid::new_v4());

        let audio_rtp = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48_000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            format!("audio-{}", uuid::Uuid::new_v4()),
            stream_id.clone(),
        ));
        let audio = MediaTrack::new(TrackKind::Audio, audio_rtp);

        let video = if profile.video {
            let video_rtp = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90_000, // Standard 90kHz clock for video
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                format!("video-{}", uuid::Uuid::new_v4()),
                stream_id,
            ));
            Some(MediaTrack::new(TrackKind::Video, video_rtp))
        } else {
            None
        };

        debug!(video = profile.video, "Captured local stream");
        Ok(LocalMediaStream::new(audio, video))
    }
}

/// A media source that always fails, for exercising device-denied paths
#[derive(Debug, Default, Clone)]
pub struct DeniedSource;

#[async_trait]
impl MediaSource for DeniedSource {
    async fn capture(&self, _profile: MediaProfile) -> Result<LocalMediaStream> {
        Err(Error::Media("capture device denied".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_audio_only() {
        let source = StaticSampleSource::new();
        let stream = source.capture(MediaProfile { video: false }).await.unwrap();

        assert!(stream.video().is_none());
        assert!(stream.audio().is_enabled());
        assert!(stream.is_live());
    }

    #[tokio::test]
    async fn test_capture_with_video() {
        let source = StaticSampleSource::new();
        let stream = source.capture(MediaProfile { video: true }).await.unwrap();

        assert!(stream.video().is_some());
        assert_eq!(stream.video().unwrap().kind(), TrackKind::Video);
    }

    #[tokio::test]
    async fn test_toggles_are_idempotent_and_in_place() {
        let source = StaticSampleSource::new();
        let stream = source.capture(MediaProfile { video: true }).await.unwrap();

        stream.set_audio_enabled(false);
        stream.set_audio_enabled(false);
        assert!(!stream.audio().is_enabled());
        // Disabling never stops the track
        assert!(!stream.audio().is_stopped());

        stream.set_audio_enabled(true);
        assert!(stream.audio().is_enabled());

        stream.set_video_enabled(false);
        assert!(!stream.video().unwrap().is_enabled());
    }

    #[tokio::test]
    async fn test_video_toggle_on_audio_only_is_noop() {
        let source = StaticSampleSource::new();
        let stream = source.capture(MediaProfile { video: false }).await.unwrap();
        stream.set_video_enabled(false);
        assert!(stream.is_live());
    }

    #[tokio::test]
    async fn test_stop_all_is_idempotent() {
        let source = StaticSampleSource::new();
        let stream = source.capture(MediaProfile { video: true }).await.unwrap();

        assert!(stream.audio().stop());
        assert!(!stream.audio().stop());

        stream.stop_all();
        stream.stop_all();
        assert!(!stream.is_live());
    }

    #[tokio::test]
    async fn test_denied_source_fails() {
        let source = DeniedSource;
        let err = source.capture(MediaProfile { video: true }).await;
        assert!(err.unwrap_err().is_media());
    }
}
