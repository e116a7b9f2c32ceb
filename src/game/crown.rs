//! Leader ("crown") tracking
//!
//! Polls the round's victory model on a fixed interval, ranks players by
//! their victory value and moves a single crown indicator to the leader.
//! At most one player holds the crown at any time.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::events::{EndpointId, EventBus, GameEvent, Topic};
use crate::game::constants::crown;
use crate::game::player::{PlayerId, PlayerRecord, RosterAccess};
use crate::game::victory::{VictoryConditionManager, VictoryKind};

/// How ties for the highest victory value are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    LowestId,
    /// Uniform choice among the tied players; an incumbent leader who is
    /// still tied keeps the crown
    Random,
    /// Earliest player in round setup order
    FirstSeen,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lowest_id" | "lowest" => Ok(TieBreak::LowestId),
            "random" => Ok(TieBreak::Random),
            "first_seen" | "first" => Ok(TieBreak::FirstSeen),
            other => Err(format!("unknown tie-break '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrownConfig {
    /// Seconds between polls
    pub poll_interval: f32,
    pub tie_break: TieBreak,
}

impl Default for CrownConfig {
    fn default() -> Self {
        Self {
            poll_interval: crown::POLL_INTERVAL,
            tie_break: TieBreak::default(),
        }
    }
}

/// The one crown object. It is moved between players, never rebuilt.
#[derive(Debug, Default)]
pub struct CrownIndicator {
    holder: Option<PlayerId>,
    attachments: u32,
}

impl CrownIndicator {
    pub fn holder(&self) -> Option<PlayerId> {
        self.holder
    }

    /// Times the indicator has been attached to a player
    pub fn attachments(&self) -> u32 {
        self.attachments
    }

    fn attach(&mut self, id: PlayerId) {
        self.holder = Some(id);
        self.attachments += 1;
    }

    fn detach(&mut self) -> Option<PlayerId> {
        self.holder.take()
    }
}

/// Victory value for custom rounds
pub type ValueFallback = Box<dyn Fn(&PlayerRecord) -> i64>;

/// Topics published by the crown manager
pub const CROWN_TOPICS: &[Topic] = &[
    Topic::CrownAwarded,
    Topic::CrownRemoved,
    Topic::CrownTransferred,
];

pub struct CrownManager {
    bus: Rc<EventBus>,
    endpoint: EndpointId,
    config: CrownConfig,
    victory: Option<Rc<RefCell<VictoryConditionManager>>>,
    leader: Option<PlayerId>,
    /// Rebuilt every poll, in round setup order
    values: Vec<(PlayerId, i64)>,
    indicator: CrownIndicator,
    poll_timer: f32,
    active: bool,
    fallback: ValueFallback,
    rng: StdRng,
}

impl CrownManager {
    pub fn new(bus: Rc<EventBus>, config: CrownConfig, seed: Option<u64>) -> Self {
        let endpoint = bus.register("crown", CROWN_TOPICS);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            bus,
            endpoint,
            config,
            victory: None,
            leader: None,
            values: Vec::new(),
            indicator: CrownIndicator::default(),
            poll_timer: 0.0,
            active: false,
            fallback: Box::new(|record| i64::from(record.health())),
            rng,
        }
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// Attach to a round's victory manager. Any previous leader is cleared.
    pub fn setup(&mut self, victory: Rc<RefCell<VictoryConditionManager>>) {
        self.remove();
        self.values.clear();
        self.victory = Some(victory);
        self.poll_timer = 0.0;
    }

    pub fn set_config(&mut self, config: CrownConfig) {
        self.config = config;
    }

    /// Victory value used for custom rounds (default: current health)
    pub fn set_fallback(&mut self, fallback: ValueFallback) {
        self.fallback = fallback;
    }

    /// Begin polling; the first poll happens on the next tick
    pub fn start(&mut self) {
        self.active = true;
        self.poll_timer = 0.0;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn leader(&self) -> Option<PlayerId> {
        self.leader
    }

    pub fn values(&self) -> &[(PlayerId, i64)] {
        &self.values
    }

    pub fn indicator(&self) -> &CrownIndicator {
        &self.indicator
    }

    /// Count down the poll interval. Returns true if a poll ran this tick.
    pub fn tick(&mut self, dt: f32, roster: &dyn RosterAccess) -> bool {
        if !self.active {
            return false;
        }
        self.poll_timer -= dt;
        if self.poll_timer > 0.0 {
            return false;
        }
        self.poll_timer = (self.poll_timer + self.config.poll_interval).max(0.0);
        self.poll(roster);
        true
    }

    /// Recompute victory values and move the crown if the leader changed
    pub fn poll(&mut self, roster: &dyn RosterAccess) -> Option<PlayerId> {
        match self.compute_values(roster) {
            Some(values) => self.values = values,
            None => return self.leader,
        }
        let resolved = self.resolve();
        self.apply_leader(resolved);
        self.leader
    }

    fn compute_values(&self, roster: &dyn RosterAccess) -> Option<Vec<(PlayerId, i64)>> {
        let victory = self.victory.as_ref()?;
        let Ok(victory) = victory.try_borrow() else {
            warn!("Victory manager busy; crown poll skipped");
            return None;
        };
        let model = victory.model();

        let values = model
            .players()
            .iter()
            .copied()
            .filter(|id| !model.is_eliminated(*id))
            .filter_map(|id| {
                let value = match model.kind() {
                    VictoryKind::Elimination => roster.record(id).map(|r| i64::from(r.lives))?,
                    VictoryKind::Score | VictoryKind::TimeLimit => i64::from(model.score(id)?),
                    VictoryKind::Custom => roster.record(id).map(|r| (self.fallback)(r))?,
                };
                Some((id, value))
            })
            .collect();
        Some(values)
    }

    fn resolve(&mut self) -> Option<PlayerId> {
        let best = self.values.iter().map(|(_, v)| *v).max()?;
        let tied: Vec<PlayerId> = self
            .values
            .iter()
            .filter(|(_, v)| *v == best)
            .map(|(id, _)| *id)
            .collect();

        match self.config.tie_break {
            TieBreak::LowestId => tied.iter().copied().min(),
            TieBreak::FirstSeen => tied.first().copied(),
            TieBreak::Random => match self.leader {
                Some(current) if tied.contains(&current) => Some(current),
                _ => tied.choose(&mut self.rng).copied(),
            },
        }
    }

    fn apply_leader(&mut self, resolved: Option<PlayerId>) {
        if resolved == self.leader {
            return;
        }
        let old = self.leader.take();

        if let Some(old) = old {
            self.indicator.detach();
            self.bus
                .publish(self.endpoint, GameEvent::CrownRemoved { player: old });
        }
        if let Some(new) = resolved {
            self.indicator.attach(new);
            self.leader = Some(new);
            self.bus
                .publish(self.endpoint, GameEvent::CrownAwarded { player: new });
        }
        if let (Some(from), Some(to)) = (old, resolved) {
            info!("Crown moved {} -> {}", from, to);
            self.bus
                .publish(self.endpoint, GameEvent::CrownTransferred { from, to });
        }
    }

    /// Clear the leader immediately, without waiting for a poll
    pub fn remove(&mut self) {
        if let Some(old) = self.leader.take() {
            self.indicator.detach();
            debug!("Crown removed from {}", old);
            self.bus
                .publish(self.endpoint, GameEvent::CrownRemoved { player: old });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ids, EventRecorder};

    #[derive(Default)]
    struct Roster(Vec<PlayerRecord>);

    impl Roster {
        fn with(ids: &[u32]) -> Self {
            Roster(
                ids.iter()
                    .map(|id| PlayerRecord::new(PlayerId(*id), format!("P{}", id)))
                    .collect(),
            )
        }

        fn get_mut(&mut self, id: u32) -> &mut PlayerRecord {
            self.0.iter_mut().find(|r| r.id == PlayerId(id)).unwrap()
        }
    }

    impl RosterAccess for Roster {
        fn record(&self, id: PlayerId) -> Option<&PlayerRecord> {
            self.0.iter().find(|r| r.id == id)
        }

        fn revive(&mut self, id: PlayerId) -> Option<&PlayerRecord> {
            let record = self.0.iter_mut().find(|r| r.id == id)?;
            record.restore();
            Some(record)
        }
    }

    struct Fixture {
        crown: CrownManager,
        victory: Rc<RefCell<VictoryConditionManager>>,
        recorder: EventRecorder,
    }

    fn fixture(players: &[u32], kind: VictoryKind, tie_break: TieBreak) -> Fixture {
        let bus = Rc::new(EventBus::new());
        let victory = Rc::new(RefCell::new(VictoryConditionManager::new(bus.clone())));
        victory.borrow_mut().setup(&ids(players), kind, false);
        victory.borrow_mut().start_tracking();

        let mut crown = CrownManager::new(
            bus.clone(),
            CrownConfig {
                poll_interval: 0.5,
                tie_break,
            },
            Some(3),
        );
        let recorder = EventRecorder::attach(&bus, crown.endpoint(), CROWN_TOPICS);
        crown.setup(victory.clone());
        crown.start();
        Fixture {
            crown,
            victory,
            recorder,
        }
    }

    #[test]
    fn test_lowest_id_tie_break() {
        let mut f = fixture(&[1, 3, 2], VictoryKind::Score, TieBreak::LowestId);
        for id in [1, 3, 2] {
            f.victory.borrow_mut().set_score(PlayerId(id), 5);
        }
        let roster = Roster::with(&[1, 2, 3]);
        assert_eq!(f.crown.poll(&roster), Some(PlayerId(1)));
    }

    #[test]
    fn test_first_seen_tie_break() {
        let mut f = fixture(&[3, 1, 2], VictoryKind::Score, TieBreak::FirstSeen);
        let roster = Roster::with(&[1, 2, 3]);
        assert_eq!(f.crown.poll(&roster), Some(PlayerId(3)));
    }

    #[test]
    fn test_random_tie_break_picks_tied_and_sticks() {
        let mut f = fixture(&[0, 1, 2, 3], VictoryKind::Score, TieBreak::Random);
        f.victory.borrow_mut().set_score(PlayerId(1), 4);
        f.victory.borrow_mut().set_score(PlayerId(2), 4);
        let roster = Roster::with(&[0, 1, 2, 3]);

        let first = f.crown.poll(&roster).unwrap();
        assert!(first == PlayerId(1) || first == PlayerId(2));
        for _ in 0..20 {
            assert_eq!(f.crown.poll(&roster), Some(first));
        }
        assert_eq!(f.recorder.count(Topic::CrownAwarded), 1);
    }

    #[test]
    fn test_repeated_polls_are_idempotent() {
        let mut f = fixture(&[0, 1], VictoryKind::Score, TieBreak::LowestId);
        f.victory.borrow_mut().add_score(PlayerId(1), 3);
        let roster = Roster::with(&[0, 1]);

        for _ in 0..5 {
            f.crown.poll(&roster);
        }
        assert_eq!(f.recorder.events(), vec![GameEvent::CrownAwarded { player: PlayerId(1) }]);
        assert_eq!(f.crown.indicator().attachments(), 1);
    }

    #[test]
    fn test_transfer_emits_removed_awarded_transferred() {
        let mut f = fixture(&[0, 1], VictoryKind::Score, TieBreak::LowestId);
        let roster = Roster::with(&[0, 1]);
        f.victory.borrow_mut().add_score(PlayerId(0), 1);
        f.crown.poll(&roster);
        f.recorder.clear();

        f.victory.borrow_mut().add_score(PlayerId(1), 2);
        assert_eq!(f.crown.poll(&roster), Some(PlayerId(1)));
        assert_eq!(
            f.recorder.events(),
            vec![
                GameEvent::CrownRemoved { player: PlayerId(0) },
                GameEvent::CrownAwarded { player: PlayerId(1) },
                GameEvent::CrownTransferred {
                    from: PlayerId(0),
                    to: PlayerId(1),
                },
            ]
        );
        assert_eq!(f.crown.indicator().holder(), Some(PlayerId(1)));
    }

    #[test]
    fn test_elimination_uses_lives() {
        let mut f = fixture(&[0, 1, 2], VictoryKind::Elimination, TieBreak::LowestId);
        let mut roster = Roster::with(&[0, 1, 2]);
        roster.get_mut(0).lives = 1;
        roster.get_mut(1).lives = 3;
        roster.get_mut(2).lives = 2;
        assert_eq!(f.crown.poll(&roster), Some(PlayerId(1)));

        f.victory.borrow_mut().eliminate(PlayerId(1));
        assert_eq!(f.crown.poll(&roster), Some(PlayerId(2)));
    }

    #[test]
    fn test_custom_uses_fallback_value() {
        let mut f = fixture(&[0, 1], VictoryKind::Custom, TieBreak::LowestId);
        let mut roster = Roster::with(&[0, 1]);
        roster.get_mut(0).set_health(30);
        assert_eq!(f.crown.poll(&roster), Some(PlayerId(1)));

        f.crown.set_fallback(Box::new(|r| -i64::from(r.health())));
        assert_eq!(f.crown.poll(&roster), Some(PlayerId(0)));
    }

    #[test]
    fn test_no_players_means_no_leader() {
        let mut f = fixture(&[], VictoryKind::Score, TieBreak::LowestId);
        assert_eq!(f.crown.poll(&Roster::default()), None);
        assert!(f.recorder.events().is_empty());
    }

    #[test]
    fn test_polls_on_interval_only() {
        let mut f = fixture(&[0, 1], VictoryKind::Score, TieBreak::LowestId);
        let roster = Roster::with(&[0, 1]);

        assert!(f.crown.tick(0.1, &roster));
        assert!(!f.crown.tick(0.1, &roster));
        assert!(!f.crown.tick(0.1, &roster));
        assert!(f.crown.tick(0.25, &roster));
    }

    #[test]
    fn test_remove_clears_leader_immediately() {
        let mut f = fixture(&[0, 1], VictoryKind::Score, TieBreak::LowestId);
        let roster = Roster::with(&[0, 1]);
        f.crown.poll(&roster);
        f.crown.remove();

        assert_eq!(f.crown.leader(), None);
        assert_eq!(f.crown.indicator().holder(), None);
        assert_eq!(f.recorder.count(Topic::CrownRemoved), 1);

        f.crown.remove();
        assert_eq!(f.recorder.count(Topic::CrownRemoved), 1);
    }

    #[test]
    fn test_stopped_manager_does_not_poll() {
        let mut f = fixture(&[0], VictoryKind::Score, TieBreak::LowestId);
        f.crown.stop();
        assert!(!f.crown.tick(1.0, &Roster::with(&[0])));
        assert_eq!(f.crown.leader(), None);
    }

    #[test]
    fn test_tie_break_from_str() {
        assert_eq!("random".parse::<TieBreak>(), Ok(TieBreak::Random));
        assert_eq!("FIRST_SEEN".parse::<TieBreak>(), Ok(TieBreak::FirstSeen));
        assert!("coin".parse::<TieBreak>().is_err());
    }
}
