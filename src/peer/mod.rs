//! Peer connections: transport seam, per-remote handles, and the registry

pub mod handle;
pub mod registry;
pub mod transport;
pub mod webrtc;

pub use handle::ConnectionHandle;
pub use registry::ConnectionRegistry;
pub use transport::{
    LinkState, NegotiationRole, PeerTransport, PeerTransportFactory, TransportEvent,
};
pub use webrtc::{WebRtcTransport, WebRtcTransportFactory};
