//! Session lifecycle: phases, events, and the machine that drives them

pub mod events;
pub mod machine;
pub mod state;

pub use events::SessionEvent;
pub use machine::SessionMachine;
pub use state::{EndReason, SessionPhase, SessionRole};
