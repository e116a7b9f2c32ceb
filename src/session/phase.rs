//! Session phases and the legal transition table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// High-level session phase. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Initializing,
    Menu,
    Loading,
    MapView,
    Round,
    Paused,
    Ended,
    Transitioning,
}

impl SessionPhase {
    pub const ALL: [SessionPhase; 8] = [
        SessionPhase::Initializing,
        SessionPhase::Menu,
        SessionPhase::Loading,
        SessionPhase::MapView,
        SessionPhase::Round,
        SessionPhase::Paused,
        SessionPhase::Ended,
        SessionPhase::Transitioning,
    ];

    /// Phases reachable from this one. `Transitioning` may go anywhere.
    pub fn allowed_targets(self) -> &'static [SessionPhase] {
        use SessionPhase::*;
        match self {
            Initializing => &[Menu, Loading],
            Menu => &[MapView, Loading, Ended],
            Loading => &[Menu, MapView, Round],
            MapView => &[Round, Menu, Paused, Ended, Loading],
            Round => &[MapView, Paused, Ended, Loading],
            Paused => &[MapView, Round, Menu],
            Ended => &[Menu, Loading],
            Transitioning => &SessionPhase::ALL,
        }
    }

    pub fn can_transition_to(self, target: SessionPhase) -> bool {
        self.allowed_targets().contains(&target)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Current phase plus the one before it and when it changed
#[derive(Debug, Clone)]
pub struct PhaseState {
    pub current: SessionPhase,
    pub previous: SessionPhase,
    pub changed_at: Instant,
}

impl PhaseState {
    pub fn new() -> Self {
        Self {
            current: SessionPhase::Initializing,
            previous: SessionPhase::Initializing,
            changed_at: Instant::now(),
        }
    }

    pub(crate) fn advance(&mut self, target: SessionPhase) -> SessionPhase {
        let old = self.current;
        self.previous = old;
        self.current = target;
        self.changed_at = Instant::now();
        old
    }

    pub fn time_in_phase(&self) -> std::time::Duration {
        self.changed_at.elapsed()
    }
}

impl Default for PhaseState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_edges() {
        use SessionPhase::*;
        assert!(Initializing.can_transition_to(Menu));
        assert!(!Initializing.can_transition_to(Round));
        assert!(Loading.can_transition_to(Round));
        assert!(!Menu.can_transition_to(Round));
        assert!(Paused.can_transition_to(Round));
        assert!(!Ended.can_transition_to(Round));
        assert!(Round.can_transition_to(Ended));
    }

    #[test]
    fn test_transitioning_reaches_everything() {
        for target in SessionPhase::ALL {
            assert!(SessionPhase::Transitioning.can_transition_to(target));
        }
    }

    #[test]
    fn test_nothing_but_transitioning_enters_transitioning() {
        for phase in SessionPhase::ALL {
            if phase != SessionPhase::Transitioning {
                assert!(!phase.can_transition_to(SessionPhase::Transitioning));
            }
        }
    }

    #[test]
    fn test_advance_tracks_previous() {
        let mut state = PhaseState::new();
        let old = state.advance(SessionPhase::Menu);
        assert_eq!(old, SessionPhase::Initializing);
        assert_eq!(state.previous, SessionPhase::Initializing);
        assert_eq!(state.current, SessionPhase::Menu);
    }
}
