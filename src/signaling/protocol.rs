//! Signal wire types for the offer/answer/candidate exchange

use serde::{Deserialize, Serialize};

/// ICE candidate payload carried inside a candidate [`Signal`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CandidateInit {
    /// Candidate attribute line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the media description this candidate belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,

    /// ICE username fragment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Type-specific body of a [`Signal`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SignalBody {
    /// Session description offered by the negotiation initiator
    Offer {
        /// SDP offer
        sdp: String,
    },

    /// Session description answering an offer
    Answer {
        /// SDP answer
        sdp: String,
    },

    /// Network reachability descriptor discovered during negotiation
    Candidate(CandidateInit),

    /// Host-initiated forcible removal of the recipient
    Kicked,
}

/// One unit of the signaling exchange, addressed to a single recipient
///
/// Signals are append-only on the channel. `seq` is assigned by the channel
/// at append time and increases monotonically per session; it establishes
/// delivery order only and is never used to deduplicate (the channel may
/// redeliver).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signal {
    /// Unique signal identifier
    pub id: String,

    /// Sender identity
    pub from: String,

    /// Recipient identity (always a single identity)
    pub to: String,

    /// Per-session append sequence, assigned by the channel
    pub seq: u64,

    /// Type-specific body
    #[serde(flatten)]
    pub body: SignalBody,
}

impl Signal {
    fn new(from: &str, to: &str, body: SignalBody) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            seq: 0,
            body,
        }
    }

    /// Create an offer signal
    pub fn offer(from: &str, to: &str, sdp: String) -> Self {
        Self::new(from, to, SignalBody::Offer { sdp })
    }

    /// Create an answer signal
    pub fn answer(from: &str, to: &str, sdp: String) -> Self {
        Self::new(from, to, SignalBody::Answer { sdp })
    }

    /// Create a candidate signal
    pub fn candidate(from: &str, to: &str, candidate: CandidateInit) -> Self {
        Self::new(from, to, SignalBody::Candidate(candidate))
    }

    /// Create a kicked signal
    pub fn kicked(from: &str, to: &str) -> Self {
        Self::new(from, to, SignalBody::Kicked)
    }

    /// Short name of the body type, for logging
    pub fn kind(&self) -> &'static str {
        match self.body {
            SignalBody::Offer { .. } => "offer",
            SignalBody::Answer { .. } => "answer",
            SignalBody::Candidate(_) => "candidate",
            SignalBody::Kicked => "kicked",
        }
    }
}

/// What a session carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// 1:1 audio-only call
    VoiceCall,
    /// 1:1 audio/video call
    VideoCall,
    /// One host, many viewers
    Broadcast,
}

impl SessionKind {
    /// Whether sessions of this kind carry a video track
    pub fn has_video(&self) -> bool {
        matches!(self, SessionKind::VideoCall | SessionKind::Broadcast)
    }

    /// Whether this kind is a 1:1 call
    pub fn is_call(&self) -> bool {
        matches!(self, SessionKind::VoiceCall | SessionKind::VideoCall)
    }
}

/// Lifecycle status of the shared session record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, not yet answered (calls)
    Pending,
    /// Live
    Active,
    /// Terminated by the owning party
    Ended,
}

/// Shared session record as seen through the channel adapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    /// Opaque session identifier, stable for the session's lifetime
    pub id: String,

    /// What the session carries
    pub kind: SessionKind,

    /// Identity of the party who owns the session
    pub host_id: String,

    /// Current status, owned by the terminating authority
    pub status: SessionStatus,
}

/// A pending call invitation addressed to a local identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invitation {
    /// Session the invitation belongs to
    pub session_id: String,

    /// Kind of the inviting session
    pub kind: SessionKind,

    /// Caller identity
    pub from: String,

    /// Invited identity
    pub to: String,
}
