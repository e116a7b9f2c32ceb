//! Session player roster

use hashbrown::HashMap;
use tracing::warn;

use crate::game::player::{PlayerId, PlayerRecord, RosterAccess};

/// Roster errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("Roster is full ({capacity} players)")]
    Full { capacity: usize },
    #[error("Player {0} already in roster")]
    DuplicatePlayer(PlayerId),
    #[error("Player {0} not in roster")]
    UnknownPlayer(PlayerId),
}

/// Result of a health update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthChange {
    pub old: i32,
    pub new: i32,
    pub max: i32,
}

impl HealthChange {
    pub fn changed(&self) -> bool {
        self.old != self.new
    }

    pub fn died(&self) -> bool {
        self.old > 0 && self.new == 0
    }
}

/// Per-player state for the whole session, in join order
pub struct PlayerRoster {
    players: HashMap<PlayerId, PlayerRecord>,
    order: Vec<PlayerId>,
    capacity: usize,
}

impl PlayerRoster {
    pub fn new(capacity: usize) -> Self {
        Self {
            players: HashMap::with_capacity(capacity),
            order: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.order.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn add(&mut self, id: PlayerId, name: String) -> Result<&PlayerRecord, RosterError> {
        if self.is_full() {
            return Err(RosterError::Full {
                capacity: self.capacity,
            });
        }
        if self.players.contains_key(&id) {
            return Err(RosterError::DuplicatePlayer(id));
        }
        self.order.push(id);
        Ok(self
            .players
            .entry(id)
            .or_insert_with(|| PlayerRecord::new(id, name)))
    }

    pub fn remove(&mut self, id: PlayerId) -> Result<PlayerRecord, RosterError> {
        let record = self
            .players
            .remove(&id)
            .ok_or(RosterError::UnknownPlayer(id))?;
        self.order.retain(|p| *p != id);
        Ok(record)
    }

    pub fn get(&self, id: PlayerId) -> Result<&PlayerRecord, RosterError> {
        self.players.get(&id).ok_or(RosterError::UnknownPlayer(id))
    }

    /// Player ids in join order
    pub fn ids(&self) -> Vec<PlayerId> {
        self.order.clone()
    }

    /// Records in join order
    pub fn iter(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.order.iter().filter_map(|id| self.players.get(id))
    }

    pub fn alive_count(&self) -> usize {
        self.iter().filter(|p| p.is_alive()).count()
    }

    /// Set health, clamped to [0, max]
    pub fn set_health(&mut self, id: PlayerId, value: i32) -> Result<HealthChange, RosterError> {
        let record = self
            .players
            .get_mut(&id)
            .ok_or(RosterError::UnknownPlayer(id))?;
        let old = record.health();
        let new = record.set_health(value);
        Ok(HealthChange {
            old,
            new,
            max: record.max_health(),
        })
    }

    /// Take one life. Returns lives remaining.
    pub fn lose_life(&mut self, id: PlayerId) -> Result<u32, RosterError> {
        let record = self
            .players
            .get_mut(&id)
            .ok_or(RosterError::UnknownPlayer(id))?;
        record.lives = record.lives.saturating_sub(1);
        Ok(record.lives)
    }

    /// Reset every record to round-start values
    pub fn reset_for_round(&mut self, max_health: i32, lives: u32) {
        for record in self.players.values_mut() {
            record.reset_for_round(max_health, lives);
        }
    }
}

impl RosterAccess for PlayerRoster {
    fn record(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    fn revive(&mut self, id: PlayerId) -> Option<&PlayerRecord> {
        match self.players.get_mut(&id) {
            Some(record) => {
                record.restore();
                Some(record)
            }
            None => {
                warn!("Revive ignored: unknown player {}", id);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_order() {
        let mut roster = PlayerRoster::new(4);
        roster.add(PlayerId(3), "C".to_string()).unwrap();
        roster.add(PlayerId(1), "A".to_string()).unwrap();
        assert_eq!(roster.ids(), vec![PlayerId(3), PlayerId(1)]);
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_roster_full() {
        let mut roster = PlayerRoster::new(2);
        roster.add(PlayerId(0), "A".to_string()).unwrap();
        roster.add(PlayerId(1), "B".to_string()).unwrap();
        assert_eq!(
            roster.add(PlayerId(2), "C".to_string()).unwrap_err(),
            RosterError::Full { capacity: 2 }
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut roster = PlayerRoster::new(4);
        roster.add(PlayerId(0), "A".to_string()).unwrap();
        assert_eq!(
            roster.add(PlayerId(0), "A2".to_string()).unwrap_err(),
            RosterError::DuplicatePlayer(PlayerId(0))
        );
        assert_eq!(roster.get(PlayerId(0)).unwrap().name, "A");
    }

    #[test]
    fn test_remove_unknown() {
        let mut roster = PlayerRoster::new(4);
        assert_eq!(
            roster.remove(PlayerId(5)).unwrap_err(),
            RosterError::UnknownPlayer(PlayerId(5))
        );
    }

    #[test]
    fn test_set_health_reports_death() {
        let mut roster = PlayerRoster::new(4);
        roster.add(PlayerId(0), "A".to_string()).unwrap();

        let change = roster.set_health(PlayerId(0), 40).unwrap();
        assert!(change.changed());
        assert!(!change.died());

        let change = roster.set_health(PlayerId(0), -5).unwrap();
        assert_eq!(change.new, 0);
        assert!(change.died());

        let change = roster.set_health(PlayerId(0), 0).unwrap();
        assert!(!change.changed());
        assert!(!change.died());
        assert_eq!(roster.alive_count(), 0);
    }

    #[test]
    fn test_lose_life_saturates() {
        let mut roster = PlayerRoster::new(4);
        roster.add(PlayerId(0), "A".to_string()).unwrap();
        roster.reset_for_round(100, 1);
        assert_eq!(roster.lose_life(PlayerId(0)), Ok(0));
        assert_eq!(roster.lose_life(PlayerId(0)), Ok(0));
    }

    #[test]
    fn test_revive_restores_health() {
        let mut roster = PlayerRoster::new(4);
        roster.add(PlayerId(0), "A".to_string()).unwrap();
        roster.set_health(PlayerId(0), 0).unwrap();
        assert!(roster.revive(PlayerId(0)).unwrap().is_alive());
        assert!(roster.revive(PlayerId(9)).is_none());
    }
}
