//! Server side: session state machine, the service driving it, and the
//! optional registration lobby.

mod lobby;
mod service;
mod session;

pub use lobby::Lobby;
pub use service::{Coordinator, SessionOutcome};
pub use session::{
    MoveRejection, Outgoing, PlayerSlot, Registration, Session, SessionError, SessionStatus,
};
