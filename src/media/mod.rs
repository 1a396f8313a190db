//! Local media capture and in-place track control

pub mod stream;

pub use stream::{
    DeniedSource, LocalMediaStream, MediaProfile, MediaSource, MediaTrack, StaticSampleSource,
    TrackKind,
};
