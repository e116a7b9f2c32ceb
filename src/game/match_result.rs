//! Round statistics and ranking
//!
//! Computes the stats carried by `round_ended` from the round's victory
//! model, the roster and the respawn tallies.

use serde::Serialize;

use crate::game::player::{PlayerId, RosterAccess};
use crate::game::respawn::RespawnManager;
use crate::game::victory::VictoryModel;

/// Stats for a finished round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundStats {
    pub rankings: Vec<PlayerRanking>,
    pub duration: f32,
    pub total_eliminations: u32,
    pub total_respawns: u32,
}

/// Player ranking in round results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRanking {
    pub player_id: PlayerId,
    pub name: String,
    pub rank: u32,
    pub score: i32,
    pub lives: u32,
    pub eliminated: bool,
    pub respawns: u32,
}

/// Build round stats for every player the round tracked
pub fn determine_stats(
    model: &VictoryModel,
    roster: &dyn RosterAccess,
    respawn: &RespawnManager,
    duration: f32,
) -> RoundStats {
    let mut rankings: Vec<PlayerRanking> = model
        .players()
        .iter()
        .map(|id| {
            let record = roster.record(*id);
            PlayerRanking {
                player_id: *id,
                name: record.map(|r| r.name.clone()).unwrap_or_default(),
                rank: 0,
                score: model.score(*id).unwrap_or(0),
                lives: record.map(|r| r.lives).unwrap_or(0),
                eliminated: model.is_eliminated(*id),
                respawns: respawn.respawn_count(*id),
            }
        })
        .collect();

    // Sort by: survived (desc), score (desc), lives (desc), id (asc)
    rankings.sort_by(|a, b| {
        a.eliminated
            .cmp(&b.eliminated)
            .then_with(|| b.score.cmp(&a.score))
            .then_with(|| b.lives.cmp(&a.lives))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });

    for (i, ranking) in rankings.iter_mut().enumerate() {
        ranking.rank = (i + 1) as u32;
    }

    let total_respawns = rankings.iter().map(|r| r.respawns).sum();

    RoundStats {
        rankings,
        duration,
        total_eliminations: model.eliminated_count() as u32,
        total_respawns,
    }
}
