//! Signaling and peer-connection core for 1:1 calls and broadcasts
//!
//! This crate drives real-time sessions end to end: it exchanges
//! offer/answer/candidate signals over a pluggable [`SignalingChannel`],
//! negotiates peer connections through a [`PeerTransportFactory`], and
//! runs each session through a single lifecycle machine that owns the
//! local media stream, the per-remote connections, and teardown.
//!
//! Two session shapes are supported:
//!
//! - **Calls**: one caller, one callee. The side that picks up always
//!   initiates the offer, so the two parties can never offer at once.
//! - **Broadcasts**: one host, many viewers. Admission and removal are
//!   recorded on the channel before any signal is delivered, so a removed
//!   viewer can never connect by replaying old signals.
//!
//! # Example
//!
//! ```no_run
//! use peercall::config::CallConfig;
//! use peercall::media::StaticSampleSource;
//! use peercall::peer::WebRtcTransportFactory;
//! use peercall::session::SessionMachine;
//! use peercall::signaling::{InMemoryChannel, SessionKind, SignalingChannel};
//! use std::sync::Arc;
//!
//! # async fn run() -> peercall::Result<()> {
//! let config = CallConfig::default();
//! let channel: Arc<dyn SignalingChannel> = Arc::new(InMemoryChannel::new());
//! let factory = Arc::new(WebRtcTransportFactory::new(config.clone()));
//! let source = StaticSampleSource::new();
//!
//! let (call, mut events) = SessionMachine::start_call(
//!     channel,
//!     factory,
//!     &source,
//!     config,
//!     "alice",
//!     "bob",
//!     SessionKind::VideoCall,
//! )
//! .await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("call event: {:?}", event);
//! }
//! call.hang_up().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod admission;
pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod watcher;

pub use config::CallConfig;
pub use error::{Error, Result};
pub use media::{LocalMediaStream, MediaProfile, MediaSource, StaticSampleSource};
pub use peer::{PeerTransport, PeerTransportFactory, WebRtcTransportFactory};
pub use session::{EndReason, SessionEvent, SessionMachine, SessionPhase, SessionRole};
pub use signaling::{
    InMemoryChannel, Invitation, SessionKind, Signal, SignalBody, SignalingChannel,
};
pub use watcher::IncomingCallWatcher;
