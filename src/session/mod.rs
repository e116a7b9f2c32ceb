//! Session coordination: phases, roster, rounds and progress.

pub mod coordinator;
pub mod deferred;
pub mod phase;
pub mod progress;
pub mod roster;
pub mod round;

pub use coordinator::{SessionCoordinator, SessionError, SessionId, SESSION_TOPICS};
pub use phase::SessionPhase;
pub use roster::{PlayerRoster, RosterError};
pub use round::{RoundCatalog, RoundContext, RoundLauncher, RoundServices, RoundSpec};
