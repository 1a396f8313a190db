//! Error types for the call and broadcast signaling core

/// Result type alias using the peercall Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating or running a session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Viewer admission refused (session inactive, viewer removed, privacy)
    #[error("Admission refused: {0}")]
    Admission(String),

    /// Media capture error (device denied or unavailable)
    #[error("Media capture error: {0}")]
    Media(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    Sdp(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// Peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// No connection handle exists for the given remote peer
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Signaling exchange error
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Signaling channel error (publish/subscribe failure)
    #[error("Channel error: {0}")]
    Channel(String),

    /// Session not found on the signaling channel
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Operation is not legal in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation timeout
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is an admission refusal
    ///
    /// Admission errors surface before a session is ever created locally.
    pub fn is_admission(&self) -> bool {
        matches!(self, Error::Admission(_))
    }

    /// Check if this error is a media capture failure
    pub fn is_media(&self) -> bool {
        matches!(self, Error::Media(_))
    }

    /// Check if this error is a negotiation failure
    pub fn is_negotiation(&self) -> bool {
        matches!(
            self,
            Error::Sdp(_) | Error::IceCandidate(_) | Error::PeerConnection(_)
        )
    }

    /// Check if this error is a signaling channel failure
    pub fn is_channel(&self) -> bool {
        matches!(self, Error::Channel(_) | Error::Signaling(_))
    }
}
