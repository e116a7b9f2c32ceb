//! Event topics and payloads carried by the bus

use serde::Serialize;
use std::fmt;

use crate::game::match_result::RoundStats;
use crate::game::player::PlayerId;
use crate::game::victory::{Outcome, ScoreTarget, VictoryResult};
use crate::session::phase::SessionPhase;
use crate::util::vec2::Vec2;

/// Topic names a source can declare and a subscriber can listen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Topic {
    PhaseChanged,
    PhaseTransitionCompleted,
    PhaseTransitionFailed,
    PlayerJoined,
    PlayerLeft,
    PlayerHealthChanged,
    PlayerLivesChanged,
    DamageReported,
    PlayerDied,
    PlayerRespawned,
    RespawnDenied,
    RespawnTimerUpdated,
    ScoreChanged,
    PlayerEliminated,
    VictoryAchieved,
    CrownAwarded,
    CrownRemoved,
    CrownTransferred,
    RoundStarted,
    RoundEnded,
}

impl Topic {
    pub const ALL: [Topic; 20] = [
        Topic::PhaseChanged,
        Topic::PhaseTransitionCompleted,
        Topic::PhaseTransitionFailed,
        Topic::PlayerJoined,
        Topic::PlayerLeft,
        Topic::PlayerHealthChanged,
        Topic::PlayerLivesChanged,
        Topic::DamageReported,
        Topic::PlayerDied,
        Topic::PlayerRespawned,
        Topic::RespawnDenied,
        Topic::RespawnTimerUpdated,
        Topic::ScoreChanged,
        Topic::PlayerEliminated,
        Topic::VictoryAchieved,
        Topic::CrownAwarded,
        Topic::CrownRemoved,
        Topic::CrownTransferred,
        Topic::RoundStarted,
        Topic::RoundEnded,
    ];

    /// Wire name of the topic
    pub fn name(self) -> &'static str {
        match self {
            Topic::PhaseChanged => "phase_changed",
            Topic::PhaseTransitionCompleted => "phase_transition_completed",
            Topic::PhaseTransitionFailed => "phase_transition_failed",
            Topic::PlayerJoined => "player_joined",
            Topic::PlayerLeft => "player_left",
            Topic::PlayerHealthChanged => "player_health_changed",
            Topic::PlayerLivesChanged => "player_lives_changed",
            Topic::DamageReported => "damage_reported",
            Topic::PlayerDied => "player_died",
            Topic::PlayerRespawned => "player_respawned",
            Topic::RespawnDenied => "respawn_denied",
            Topic::RespawnTimerUpdated => "respawn_timer_updated",
            Topic::ScoreChanged => "score_changed",
            Topic::PlayerEliminated => "player_eliminated",
            Topic::VictoryAchieved => "victory_achieved",
            Topic::CrownAwarded => "crown_awarded",
            Topic::CrownRemoved => "crown_removed",
            Topic::CrownTransferred => "crown_transferred",
            Topic::RoundStarted => "round_started",
            Topic::RoundEnded => "round_ended",
        }
    }

    /// Look a topic up by its wire name
    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::ALL.iter().copied().find(|t| t.name() == name)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a phase transition was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionFailure {
    /// The edge is not in the transition table
    NotAllowed,
}

impl fmt::Display for TransitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionFailure::NotAllowed => f.write_str("transition not allowed"),
        }
    }
}

/// Why a respawn was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DenialReason {
    /// Player is in the blocked set
    Blocked,
    /// Player used up the configured respawn count
    LimitReached,
    /// Player left the roster while waiting
    Orphaned,
}

/// Every event published through the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum GameEvent {
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    PhaseTransitionCompleted {
        phase: SessionPhase,
    },
    PhaseTransitionFailed {
        from: SessionPhase,
        to: SessionPhase,
        reason: TransitionFailure,
    },
    PlayerJoined {
        player: PlayerId,
        name: String,
    },
    PlayerLeft {
        player: PlayerId,
    },
    PlayerHealthChanged {
        player: PlayerId,
        health: i32,
        max_health: i32,
    },
    PlayerLivesChanged {
        player: PlayerId,
        lives: u32,
    },
    DamageReported {
        player: PlayerId,
        amount: i32,
        attacker: Option<PlayerId>,
    },
    PlayerDied {
        player: PlayerId,
        lives_remaining: u32,
    },
    PlayerRespawned {
        player: PlayerId,
        position: Vec2,
        health: i32,
    },
    RespawnDenied {
        player: PlayerId,
        reason: DenialReason,
    },
    RespawnTimerUpdated {
        player: PlayerId,
        seconds_left: f32,
    },
    ScoreChanged {
        target: ScoreTarget,
        value: i32,
    },
    PlayerEliminated {
        player: PlayerId,
    },
    VictoryAchieved(VictoryResult),
    CrownAwarded {
        player: PlayerId,
    },
    CrownRemoved {
        player: PlayerId,
    },
    CrownTransferred {
        from: PlayerId,
        to: PlayerId,
    },
    RoundStarted {
        kind: String,
    },
    RoundEnded {
        kind: String,
        outcome: Option<Outcome>,
        stats: RoundStats,
    },
}

impl GameEvent {
    pub fn topic(&self) -> Topic {
        match self {
            GameEvent::PhaseChanged { .. } => Topic::PhaseChanged,
            GameEvent::PhaseTransitionCompleted { .. } => Topic::PhaseTransitionCompleted,
            GameEvent::PhaseTransitionFailed { .. } => Topic::PhaseTransitionFailed,
            GameEvent::PlayerJoined { .. } => Topic::PlayerJoined,
            GameEvent::PlayerLeft { .. } => Topic::PlayerLeft,
            GameEvent::PlayerHealthChanged { .. } => Topic::PlayerHealthChanged,
            GameEvent::PlayerLivesChanged { .. } => Topic::PlayerLivesChanged,
            GameEvent::DamageReported { .. } => Topic::DamageReported,
            GameEvent::PlayerDied { .. } => Topic::PlayerDied,
            GameEvent::PlayerRespawned { .. } => Topic::PlayerRespawned,
            GameEvent::RespawnDenied { .. } => Topic::RespawnDenied,
            GameEvent::RespawnTimerUpdated { .. } => Topic::RespawnTimerUpdated,
            GameEvent::ScoreChanged { .. } => Topic::ScoreChanged,
            GameEvent::PlayerEliminated { .. } => Topic::PlayerEliminated,
            GameEvent::VictoryAchieved(_) => Topic::VictoryAchieved,
            GameEvent::CrownAwarded { .. } => Topic::CrownAwarded,
            GameEvent::CrownRemoved { .. } => Topic::CrownRemoved,
            GameEvent::CrownTransferred { .. } => Topic::CrownTransferred,
            GameEvent::RoundStarted { .. } => Topic::RoundStarted,
            GameEvent::RoundEnded { .. } => Topic::RoundEnded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(Topic::from_name(topic.name()), Some(topic));
        }
        assert_eq!(Topic::from_name("no_such_topic"), None);
    }

    #[test]
    fn test_event_topic() {
        let event = GameEvent::PlayerDied {
            player: PlayerId(2),
            lives_remaining: 1,
        };
        assert_eq!(event.topic(), Topic::PlayerDied);
        assert_eq!(event.topic().to_string(), "player_died");
    }

    #[test]
    fn test_event_serializes_with_topic_tag() {
        let event = GameEvent::CrownTransferred {
            from: PlayerId(1),
            to: PlayerId(3),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"topic\":\"crown_transferred\""));
    }
}
