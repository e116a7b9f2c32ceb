//! Board position, round history and win tallies across a session

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::game::player::PlayerId;
use crate::game::victory::{Outcome, ScoreTarget, VictoryModel};

/// A round that ran to completion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedRound {
    pub kind: String,
    /// Players credited with the win (empty on a draw)
    pub winners: Vec<PlayerId>,
}

/// Progress as seen by a round when it starts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub map_position: u32,
    pub completed: Vec<CompletedRound>,
    /// Unix time in milliseconds
    pub taken_at: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionProgress {
    map_position: u32,
    completed: Vec<CompletedRound>,
    wins: BTreeMap<PlayerId, u32>,
}

impl SessionProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_position(&self) -> u32 {
        self.map_position
    }

    pub fn completed(&self) -> &[CompletedRound] {
        &self.completed
    }

    pub fn wins(&self, id: PlayerId) -> u32 {
        self.wins.get(&id).copied().unwrap_or(0)
    }

    /// Record a finished round and advance the board. Team wins credit every
    /// tracked member of the team. Returns the credited players.
    pub fn record(&mut self, kind: &str, outcome: Outcome, model: &VictoryModel) -> Vec<PlayerId> {
        let winners: Vec<PlayerId> = match outcome {
            Outcome::Winner(ScoreTarget::Player(id)) => vec![id],
            Outcome::Winner(ScoreTarget::Team(team)) => model
                .players()
                .iter()
                .copied()
                .filter(|id| model.team_of(*id) == Some(team))
                .collect(),
            Outcome::Draw => Vec::new(),
        };
        for id in &winners {
            *self.wins.entry(*id).or_insert(0) += 1;
        }
        self.completed.push(CompletedRound {
            kind: kind.to_string(),
            winners: winners.clone(),
        });
        self.map_position += 1;
        winners
    }

    /// First player (lowest id) whose wins reached `rounds_to_win`
    pub fn champion(&self, rounds_to_win: u32) -> Option<PlayerId> {
        self.wins
            .iter()
            .find(|(_, wins)| **wins >= rounds_to_win)
            .map(|(id, _)| *id)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            map_position: self.map_position,
            completed: self.completed.clone(),
            taken_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::game::player::TeamId;
    use crate::game::victory::{VictoryConditionManager, VictoryKind};
    use crate::testing::ids;
    use std::rc::Rc;

    fn model(team_mode: bool) -> VictoryModel {
        let mut victory = VictoryConditionManager::new(Rc::new(EventBus::new()));
        victory.setup(&ids(&[0, 1, 2, 3]), VictoryKind::Elimination, team_mode);
        victory.model().clone()
    }

    #[test]
    fn test_player_win_advances_board() {
        let mut progress = SessionProgress::new();
        let winners = progress.record(
            "sumo",
            Outcome::Winner(ScoreTarget::Player(PlayerId(2))),
            &model(false),
        );
        assert_eq!(winners, ids(&[2]));
        assert_eq!(progress.wins(PlayerId(2)), 1);
        assert_eq!(progress.map_position(), 1);
        assert_eq!(progress.completed()[0].kind, "sumo");
    }

    #[test]
    fn test_team_win_credits_members() {
        let mut progress = SessionProgress::new();
        let winners = progress.record(
            "team_brawl",
            Outcome::Winner(ScoreTarget::Team(TeamId(1))),
            &model(true),
        );
        assert_eq!(winners, ids(&[1, 3]));
    }

    #[test]
    fn test_draw_credits_nobody() {
        let mut progress = SessionProgress::new();
        assert!(progress.record("sumo", Outcome::Draw, &model(false)).is_empty());
        assert_eq!(progress.map_position(), 1);
        assert_eq!(progress.champion(1), None);
    }

    #[test]
    fn test_champion() {
        let mut progress = SessionProgress::new();
        let m = model(false);
        for _ in 0..2 {
            progress.record("a", Outcome::Winner(ScoreTarget::Player(PlayerId(3))), &m);
        }
        assert_eq!(progress.champion(3), None);
        assert_eq!(progress.champion(2), Some(PlayerId(3)));

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.map_position, 2);
        assert_eq!(snapshot.completed.len(), 2);
    }
}
