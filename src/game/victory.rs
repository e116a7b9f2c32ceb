//! Round win detection
//!
//! Tracks per-player (and optionally per-team) scores plus the eliminated set
//! for one round, and decides the winner according to the round's
//! [`VictoryKind`]. Once a decision is made tracking switches off and the
//! model is frozen until the next [`VictoryConditionManager::setup`].

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::events::{EndpointId, EventBus, GameEvent, SubscriptionId, Topic};
use crate::game::constants::victory::TARGET_SCORE;
use crate::game::player::{PlayerId, TeamId};

/// How a round is won
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictoryKind {
    /// Last player (or team) standing
    Elimination,
    /// First to reach the target score
    Score,
    /// Highest score when the round clock runs out
    TimeLimit,
    /// Decided by round-specific logic
    Custom,
}

/// A scoring entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTarget {
    Player(PlayerId),
    Team(TeamId),
}

/// Decision for a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Winner(ScoreTarget),
    Draw,
}

impl Outcome {
    pub fn winning_player(&self) -> Option<PlayerId> {
        match self {
            Outcome::Winner(ScoreTarget::Player(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn winning_team(&self) -> Option<TeamId> {
        match self {
            Outcome::Winner(ScoreTarget::Team(team)) => Some(*team),
            _ => None,
        }
    }
}

/// Published once per round with `victory_achieved`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VictoryResult {
    pub kind: VictoryKind,
    pub outcome: Outcome,
    pub scores: Vec<(PlayerId, i32)>,
    pub team_scores: Vec<(TeamId, i32)>,
}

/// Round-specific decision logic for [`VictoryKind::Custom`]
pub trait CustomVictoryRule {
    fn evaluate(&mut self, model: &VictoryModel) -> Option<Outcome>;
}

/// Score and elimination tallies for one round
#[derive(Debug, Clone)]
pub struct VictoryModel {
    kind: VictoryKind,
    /// Players in setup order
    order: Vec<PlayerId>,
    scores: HashMap<PlayerId, i32>,
    teams: HashMap<PlayerId, TeamId>,
    team_scores: BTreeMap<TeamId, i32>,
    eliminated: HashSet<PlayerId>,
}

impl VictoryModel {
    fn new(players: &[PlayerId], kind: VictoryKind, team_mode: bool) -> Self {
        let mut order = Vec::with_capacity(players.len());
        for id in players {
            if !order.contains(id) {
                order.push(*id);
            }
        }
        let scores = order.iter().map(|id| (*id, 0)).collect();
        let (teams, team_scores) = if team_mode {
            let teams: HashMap<PlayerId, TeamId> =
                order.iter().map(|id| (*id, id.team())).collect();
            let team_scores = teams.values().map(|t| (*t, 0)).collect();
            (teams, team_scores)
        } else {
            (HashMap::new(), BTreeMap::new())
        };

        Self {
            kind,
            order,
            scores,
            teams,
            team_scores,
            eliminated: HashSet::new(),
        }
    }

    pub fn kind(&self) -> VictoryKind {
        self.kind
    }

    /// Tracked players in setup order
    pub fn players(&self) -> &[PlayerId] {
        &self.order
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.scores.contains_key(&id)
    }

    pub fn score(&self, id: PlayerId) -> Option<i32> {
        self.scores.get(&id).copied()
    }

    pub fn is_team_mode(&self) -> bool {
        !self.teams.is_empty()
    }

    pub fn team_of(&self, id: PlayerId) -> Option<TeamId> {
        self.teams.get(&id).copied()
    }

    pub fn team_score(&self, team: TeamId) -> Option<i32> {
        self.team_scores.get(&team).copied()
    }

    pub fn is_eliminated(&self, id: PlayerId) -> bool {
        self.eliminated.contains(&id)
    }

    pub fn eliminated_count(&self) -> usize {
        self.eliminated.len()
    }

    /// Non-eliminated players in setup order
    pub fn remaining_players(&self) -> Vec<PlayerId> {
        self.order
            .iter()
            .copied()
            .filter(|id| !self.eliminated.contains(id))
            .collect()
    }

    /// Teams with at least one non-eliminated member
    pub fn remaining_teams(&self) -> BTreeSet<TeamId> {
        self.order
            .iter()
            .filter(|id| !self.eliminated.contains(*id))
            .filter_map(|id| self.teams.get(id).copied())
            .collect()
    }

    fn player_scores(&self) -> Vec<(PlayerId, i32)> {
        self.order
            .iter()
            .map(|id| (*id, self.scores.get(id).copied().unwrap_or(0)))
            .collect()
    }

    fn team_score_list(&self) -> Vec<(TeamId, i32)> {
        self.team_scores.iter().map(|(t, s)| (*t, *s)).collect()
    }
}

/// Topics published by the victory manager
pub const VICTORY_TOPICS: &[Topic] = &[
    Topic::ScoreChanged,
    Topic::PlayerEliminated,
    Topic::VictoryAchieved,
];

/// Per-round win detection
pub struct VictoryConditionManager {
    bus: Rc<EventBus>,
    endpoint: EndpointId,
    model: VictoryModel,
    target_score: i32,
    tracking: bool,
    result: Option<VictoryResult>,
    custom_rule: Option<Box<dyn CustomVictoryRule>>,
}

impl VictoryConditionManager {
    pub fn new(bus: Rc<EventBus>) -> Self {
        let endpoint = bus.register("victory", VICTORY_TOPICS);
        Self {
            bus,
            endpoint,
            model: VictoryModel::new(&[], VictoryKind::Elimination, false),
            target_score: TARGET_SCORE,
            tracking: false,
            result: None,
            custom_rule: None,
        }
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// Reset the model for a new round. Tracking stays off until
    /// [`start_tracking`](Self::start_tracking).
    pub fn setup(&mut self, players: &[PlayerId], kind: VictoryKind, team_mode: bool) {
        self.model = VictoryModel::new(players, kind, team_mode);
        self.tracking = false;
        self.result = None;
        debug!(
            "Victory setup: {:?}, {} players, team_mode={}",
            kind,
            self.model.order.len(),
            team_mode
        );
    }

    pub fn set_target_score(&mut self, target: i32) {
        self.target_score = target;
    }

    pub fn target_score(&self) -> i32 {
        self.target_score
    }

    pub fn set_custom_rule(&mut self, rule: Box<dyn CustomVictoryRule>) {
        self.custom_rule = Some(rule);
    }

    pub fn clear_custom_rule(&mut self) {
        self.custom_rule = None;
    }

    /// Begin accepting updates. Refused once a winner has been declared.
    pub fn start_tracking(&mut self) -> bool {
        if self.result.is_some() {
            warn!("Victory already decided; call setup before tracking again");
            return false;
        }
        self.tracking = true;
        true
    }

    /// Force tracking off (round end)
    pub fn stop_tracking(&mut self) {
        self.tracking = false;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn model(&self) -> &VictoryModel {
        &self.model
    }

    pub fn result(&self) -> Option<&VictoryResult> {
        self.result.as_ref()
    }

    fn accepts(&self, id: PlayerId, op: &str) -> bool {
        if !self.tracking {
            debug!("{} for {} ignored: tracking inactive", op, id);
            return false;
        }
        if !self.model.contains(id) {
            warn!("{} ignored: unknown player {}", op, id);
            return false;
        }
        true
    }

    pub fn add_score(&mut self, id: PlayerId, delta: i32) -> bool {
        if !self.accepts(id, "add_score") {
            return false;
        }
        let current = self.model.score(id).unwrap_or(0);
        self.apply_score(id, current.saturating_add(delta));
        self.evaluate();
        true
    }

    pub fn set_score(&mut self, id: PlayerId, value: i32) -> bool {
        if !self.accepts(id, "set_score") {
            return false;
        }
        self.apply_score(id, value);
        self.evaluate();
        true
    }

    fn apply_score(&mut self, id: PlayerId, value: i32) {
        let old = self.model.scores.insert(id, value).unwrap_or(0);
        if old == value {
            return;
        }
        self.bus.publish(
            self.endpoint,
            GameEvent::ScoreChanged {
                target: ScoreTarget::Player(id),
                value,
            },
        );

        if let Some(team) = self.model.team_of(id) {
            let team_score = self.model.team_scores.entry(team).or_insert(0);
            *team_score = team_score.saturating_add(value - old);
            let value = *team_score;
            self.bus.publish(
                self.endpoint,
                GameEvent::ScoreChanged {
                    target: ScoreTarget::Team(team),
                    value,
                },
            );
        }
    }

    pub fn eliminate(&mut self, id: PlayerId) -> bool {
        if !self.accepts(id, "eliminate") {
            return false;
        }
        if !self.model.eliminated.insert(id) {
            debug!("{} already eliminated", id);
            return false;
        }
        info!("Player {} eliminated", id);
        self.bus
            .publish(self.endpoint, GameEvent::PlayerEliminated { player: id });
        self.evaluate();
        true
    }

    /// Check the victory condition for the current kind and declare if decided
    pub fn evaluate(&mut self) -> Option<Outcome> {
        if !self.tracking {
            return None;
        }
        let outcome = match self.model.kind {
            VictoryKind::Elimination => self.decide_elimination(),
            VictoryKind::Score => self.decide_score(),
            VictoryKind::TimeLimit => None,
            VictoryKind::Custom => match self.custom_rule.as_mut() {
                Some(rule) => rule.evaluate(&self.model),
                None => None,
            },
        }?;
        self.declare(outcome);
        Some(outcome)
    }

    fn decide_elimination(&self) -> Option<Outcome> {
        if self.model.is_team_mode() {
            let teams = self.model.remaining_teams();
            match teams.len() {
                0 => Some(Outcome::Draw),
                1 => teams
                    .first()
                    .map(|t| Outcome::Winner(ScoreTarget::Team(*t))),
                _ => None,
            }
        } else {
            let remaining = self.model.remaining_players();
            match remaining.as_slice() {
                [] => Some(Outcome::Draw),
                [only] => Some(Outcome::Winner(ScoreTarget::Player(*only))),
                _ => None,
            }
        }
    }

    fn decide_score(&self) -> Option<Outcome> {
        if self.model.is_team_mode() {
            return self
                .model
                .team_scores
                .iter()
                .find(|(_, score)| **score >= self.target_score)
                .map(|(team, _)| Outcome::Winner(ScoreTarget::Team(*team)));
        }
        self.model
            .order
            .iter()
            .filter(|id| !self.model.is_eliminated(**id))
            .find(|id| self.model.score(**id).unwrap_or(0) >= self.target_score)
            .map(|id| Outcome::Winner(ScoreTarget::Player(*id)))
    }

    /// Decide by the current standings: a strict maximum wins, ties draw.
    /// In elimination rounds only surviving entities are considered.
    pub fn finalize_by_time(&mut self) -> Option<VictoryResult> {
        if !self.tracking {
            warn!("finalize_by_time ignored: tracking inactive");
            return None;
        }

        let survivors_only = self.model.kind == VictoryKind::Elimination;
        let candidates: Vec<(ScoreTarget, i32)> = if self.model.is_team_mode() {
            let remaining = self.model.remaining_teams();
            self.model
                .team_scores
                .iter()
                .filter(|(team, _)| !survivors_only || remaining.contains(*team))
                .map(|(team, score)| (ScoreTarget::Team(*team), *score))
                .collect()
        } else {
            self.model
                .order
                .iter()
                .filter(|id| !survivors_only || !self.model.is_eliminated(**id))
                .map(|id| (ScoreTarget::Player(*id), self.model.score(*id).unwrap_or(0)))
                .collect()
        };

        let best = candidates.iter().map(|(_, score)| *score).max();
        let leaders: Vec<ScoreTarget> = candidates
            .iter()
            .filter(|(_, score)| Some(*score) == best)
            .map(|(target, _)| *target)
            .collect();

        let outcome = match leaders.as_slice() {
            [only] => Outcome::Winner(*only),
            _ => Outcome::Draw,
        };
        self.declare(outcome);
        self.result.clone()
    }

    fn declare(&mut self, outcome: Outcome) {
        self.tracking = false;
        let result = VictoryResult {
            kind: self.model.kind,
            outcome,
            scores: self.model.player_scores(),
            team_scores: self.model.team_score_list(),
        };
        info!("Victory decided ({:?}): {:?}", result.kind, outcome);
        self.result = Some(result.clone());
        self.bus
            .publish(self.endpoint, GameEvent::VictoryAchieved(result));
    }

    /// React to bus events from the session
    pub fn handle_event(&mut self, event: &GameEvent) {
        if let GameEvent::PlayerDied {
            player,
            lives_remaining: 0,
        } = event
        {
            if self.model.kind == VictoryKind::Elimination {
                self.eliminate(*player);
            }
        }
    }

    /// Subscribe `manager` to `player_died` from `source`
    pub fn connect(manager: &Rc<RefCell<Self>>, source: EndpointId) -> SubscriptionId {
        let (bus, endpoint) = {
            let m = manager.borrow();
            (m.bus.clone(), m.endpoint)
        };
        let weak = Rc::downgrade(manager);
        bus.subscribe(source, Topic::PlayerDied, endpoint, move |event| {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            match manager.try_borrow_mut() {
                Ok(mut m) => m.handle_event(event),
                Err(_) => warn!("Victory manager busy, dropped {}", event.topic()),
            };
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ids, EventRecorder};

    fn manager(kind: VictoryKind, players: &[u32], team_mode: bool) -> (VictoryConditionManager, EventRecorder) {
        let bus = Rc::new(EventBus::new());
        let mut m = VictoryConditionManager::new(bus.clone());
        let recorder = EventRecorder::attach(&bus, m.endpoint(), VICTORY_TOPICS);
        m.setup(&ids(players), kind, team_mode);
        assert!(m.start_tracking());
        (m, recorder)
    }

    fn winner(recorder: &EventRecorder) -> Vec<Outcome> {
        recorder
            .of(Topic::VictoryAchieved)
            .into_iter()
            .filter_map(|e| match e {
                GameEvent::VictoryAchieved(r) => Some(r.outcome),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_setup_resets_scores() {
        let (mut m, _) = manager(VictoryKind::Score, &[0, 1], false);
        m.add_score(PlayerId(0), 3);
        m.setup(&ids(&[0, 1, 2]), VictoryKind::Score, false);
        assert_eq!(m.model().score(PlayerId(0)), Some(0));
        assert_eq!(m.model().score(PlayerId(2)), Some(0));
        assert!(!m.is_tracking());
    }

    #[test]
    fn test_inactive_tracking_is_noop() {
        let (mut m, recorder) = manager(VictoryKind::Score, &[0, 1], false);
        m.stop_tracking();
        assert!(!m.add_score(PlayerId(0), 5));
        assert!(!m.eliminate(PlayerId(1)));
        assert_eq!(m.model().score(PlayerId(0)), Some(0));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_unknown_player_is_noop() {
        let (mut m, recorder) = manager(VictoryKind::Score, &[0, 1], false);
        assert!(!m.add_score(PlayerId(9), 5));
        assert!(!m.set_score(PlayerId(9), 5));
        assert!(!m.eliminate(PlayerId(9)));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_elimination_last_standing_wins_once() {
        let (mut m, recorder) = manager(VictoryKind::Elimination, &[0, 1, 2, 3], false);

        m.eliminate(PlayerId(1));
        m.eliminate(PlayerId(2));
        assert_eq!(m.model().remaining_players(), ids(&[0, 3]));
        assert!(winner(&recorder).is_empty());

        m.eliminate(PlayerId(3));
        assert_eq!(
            winner(&recorder),
            vec![Outcome::Winner(ScoreTarget::Player(PlayerId(0)))]
        );
        assert!(!m.is_tracking());

        // Frozen: later updates neither change tallies nor re-fire
        assert!(!m.add_score(PlayerId(0), 4));
        assert!(!m.eliminate(PlayerId(0)));
        assert_eq!(recorder.count(Topic::VictoryAchieved), 1);
    }

    #[test]
    fn test_elimination_all_out_is_draw() {
        let (mut m, recorder) = manager(VictoryKind::Elimination, &[0], false);
        m.eliminate(PlayerId(0));
        assert_eq!(winner(&recorder), vec![Outcome::Draw]);
    }

    #[test]
    fn test_elimination_team_mode() {
        // Teams: {0, 2} and {1, 3}
        let (mut m, recorder) = manager(VictoryKind::Elimination, &[0, 1, 2, 3], true);
        m.eliminate(PlayerId(1));
        m.eliminate(PlayerId(0));
        assert!(winner(&recorder).is_empty());

        m.eliminate(PlayerId(3));
        assert_eq!(
            winner(&recorder),
            vec![Outcome::Winner(ScoreTarget::Team(TeamId(0)))]
        );
    }

    #[test]
    fn test_score_target_reached() {
        let (mut m, recorder) = manager(VictoryKind::Score, &[0, 1, 2, 3], false);
        m.set_target_score(10);

        m.add_score(PlayerId(2), 6);
        assert!(winner(&recorder).is_empty());
        m.add_score(PlayerId(2), 5);

        assert_eq!(m.model().score(PlayerId(2)), Some(11));
        assert_eq!(
            winner(&recorder),
            vec![Outcome::Winner(ScoreTarget::Player(PlayerId(2)))]
        );
    }

    #[test]
    fn test_score_team_aggregate() {
        let (mut m, recorder) = manager(VictoryKind::Score, &[0, 1, 2, 3], true);
        m.set_target_score(10);

        m.add_score(PlayerId(1), 5);
        m.add_score(PlayerId(3), 4);
        assert_eq!(m.model().team_score(TeamId(1)), Some(9));
        assert!(winner(&recorder).is_empty());

        m.add_score(PlayerId(3), 1);
        assert_eq!(
            winner(&recorder),
            vec![Outcome::Winner(ScoreTarget::Team(TeamId(1)))]
        );
    }

    #[test]
    fn test_set_score_same_value_emits_once() {
        let (mut m, recorder) = manager(VictoryKind::TimeLimit, &[0, 1], false);
        m.set_score(PlayerId(0), 10);
        m.set_score(PlayerId(0), 10);
        assert_eq!(m.model().score(PlayerId(0)), Some(10));
        assert_eq!(recorder.count(Topic::ScoreChanged), 1);
    }

    #[test]
    fn test_set_score_adjusts_team_total() {
        let (mut m, _) = manager(VictoryKind::TimeLimit, &[0, 2], true);
        m.set_score(PlayerId(0), 7);
        m.set_score(PlayerId(2), 3);
        m.set_score(PlayerId(0), 2);
        assert_eq!(m.model().team_score(TeamId(0)), Some(5));
    }

    #[test]
    fn test_time_limit_never_decided_by_updates() {
        let (mut m, recorder) = manager(VictoryKind::TimeLimit, &[0, 1], false);
        m.add_score(PlayerId(0), 1000);
        m.eliminate(PlayerId(1));
        assert!(winner(&recorder).is_empty());
        assert!(m.is_tracking());
    }

    #[test]
    fn test_finalize_by_time_strict_max() {
        let (mut m, recorder) = manager(VictoryKind::TimeLimit, &[0, 1, 2], false);
        m.add_score(PlayerId(1), 4);
        m.add_score(PlayerId(2), 2);

        let result = m.finalize_by_time().unwrap();
        assert_eq!(result.outcome, Outcome::Winner(ScoreTarget::Player(PlayerId(1))));
        assert_eq!(recorder.count(Topic::VictoryAchieved), 1);
        assert!(m.finalize_by_time().is_none());
    }

    #[test]
    fn test_finalize_by_time_tie_is_draw() {
        let (mut m, _) = manager(VictoryKind::TimeLimit, &[0, 1, 2], false);
        m.add_score(PlayerId(0), 3);
        m.add_score(PlayerId(2), 3);
        assert_eq!(m.finalize_by_time().unwrap().outcome, Outcome::Draw);
    }

    #[test]
    fn test_custom_without_rule_never_decides() {
        let (mut m, recorder) = manager(VictoryKind::Custom, &[0, 1], false);
        m.add_score(PlayerId(0), 100);
        m.eliminate(PlayerId(1));
        assert!(winner(&recorder).is_empty());
    }

    struct FirstToThree;

    impl CustomVictoryRule for FirstToThree {
        fn evaluate(&mut self, model: &VictoryModel) -> Option<Outcome> {
            model
                .players()
                .iter()
                .find(|id| model.score(**id) == Some(3))
                .map(|id| Outcome::Winner(ScoreTarget::Player(*id)))
        }
    }

    #[test]
    fn test_custom_rule_decides() {
        let (mut m, recorder) = manager(VictoryKind::Custom, &[0, 1], false);
        m.set_custom_rule(Box::new(FirstToThree));
        m.add_score(PlayerId(1), 2);
        assert!(winner(&recorder).is_empty());
        m.add_score(PlayerId(1), 1);
        assert_eq!(
            winner(&recorder),
            vec![Outcome::Winner(ScoreTarget::Player(PlayerId(1)))]
        );
    }

    #[test]
    fn test_player_died_on_last_life_eliminates() {
        let bus = Rc::new(EventBus::new());
        let session = bus.register("session", &[Topic::PlayerDied]);
        let m = Rc::new(RefCell::new(VictoryConditionManager::new(bus.clone())));
        m.borrow_mut().setup(&ids(&[0, 1, 2]), VictoryKind::Elimination, false);
        m.borrow_mut().start_tracking();
        assert!(VictoryConditionManager::connect(&m, session).is_valid());

        bus.publish(
            session,
            GameEvent::PlayerDied {
                player: PlayerId(1),
                lives_remaining: 2,
            },
        );
        assert!(!m.borrow().model().is_eliminated(PlayerId(1)));

        bus.publish(
            session,
            GameEvent::PlayerDied {
                player: PlayerId(1),
                lives_remaining: 0,
            },
        );
        assert!(m.borrow().model().is_eliminated(PlayerId(1)));
    }
}
