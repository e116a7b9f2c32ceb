//! Player identity and per-player mutable state

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::game::constants::{health, lives, victory};
use crate::util::vec2::Vec2;

/// Unique player identifier, stable for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

impl PlayerId {
    /// Team assignment used in team mode (player id mod team count)
    pub fn team(self) -> TeamId {
        TeamId(self.0 % victory::TEAM_COUNT)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Team identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub u32);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Per-player state held by the roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    health: i32,
    max_health: i32,
    pub lives: u32,
}

impl PlayerRecord {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            health: health::MAX,
            max_health: health::MAX,
            lives: lives::STARTING,
        }
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn max_health(&self) -> i32 {
        self.max_health
    }

    /// Alive is derived from health, never stored
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Set health clamped to [0, max_health]. Returns the clamped value.
    pub fn set_health(&mut self, value: i32) -> i32 {
        self.health = value.clamp(0, self.max_health);
        self.health
    }

    /// Restore health to maximum
    pub fn restore(&mut self) {
        self.health = self.max_health;
    }

    /// Reset to round-start values
    pub fn reset_for_round(&mut self, max_health: i32, lives: u32) {
        self.max_health = max_health.max(1);
        self.health = self.max_health;
        self.lives = lives;
    }
}

/// Read and revive access to player records, implemented by the roster.
///
/// Round managers never hold the roster; the coordinator lends it for the
/// duration of a tick.
pub trait RosterAccess {
    fn record(&self, id: PlayerId) -> Option<&PlayerRecord>;

    /// Restore a player to full health. Returns the record if the player exists.
    fn revive(&mut self, id: PlayerId) -> Option<&PlayerRecord>;
}

/// Player actors owned by the round/scene layer.
///
/// The core only asks for visibility changes and repositioning; rendering and
/// physics stay on the other side of this trait.
pub trait PlayerActors {
    fn set_renderable(&mut self, id: PlayerId, renderable: bool);

    /// Move the actor to `position` and show a temporary invincibility effect
    fn respawn_actor(&mut self, id: PlayerId, position: Vec2, invincible_for: f32);
}

/// Actor layer that does nothing, for headless sessions
#[derive(Debug, Default)]
pub struct NullActors;

impl PlayerActors for NullActors {
    fn set_renderable(&mut self, _id: PlayerId, _renderable: bool) {}

    fn respawn_actor(&mut self, _id: PlayerId, _position: Vec2, _invincible_for: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_clamped() {
        let mut record = PlayerRecord::new(PlayerId(0), "A".to_string());
        assert_eq!(record.set_health(150), 100);
        assert_eq!(record.set_health(-20), 0);
        assert!(!record.is_alive());
    }

    #[test]
    fn test_alive_derived_from_health() {
        let mut record = PlayerRecord::new(PlayerId(0), "A".to_string());
        assert!(record.is_alive());
        record.set_health(1);
        assert!(record.is_alive());
        record.set_health(0);
        assert!(!record.is_alive());
        record.restore();
        assert_eq!(record.health(), record.max_health());
    }

    #[test]
    fn test_reset_for_round() {
        let mut record = PlayerRecord::new(PlayerId(0), "A".to_string());
        record.set_health(10);
        record.lives = 0;
        record.reset_for_round(50, 2);
        assert_eq!(record.health(), 50);
        assert_eq!(record.max_health(), 50);
        assert_eq!(record.lives, 2);
    }

    #[test]
    fn test_team_assignment() {
        assert_eq!(PlayerId(0).team(), TeamId(0));
        assert_eq!(PlayerId(3).team(), TeamId(1));
        assert_eq!(PlayerId(4).team(), TeamId(0));
    }
}
