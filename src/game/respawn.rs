//! Timer-driven respawn scheduling
//!
//! Dead players wait out a countdown and are then brought back at a random
//! respawn point. Two independent checks can refuse a respawn, always in this
//! order:
//! 1. the blocked set (round rules put permanently eliminated players here)
//! 2. the per-player respawn ceiling, if configured

use hashbrown::{HashMap, HashSet};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::events::{DenialReason, EndpointId, EventBus, GameEvent, SubscriptionId, Topic};
use crate::game::constants::respawn;
use crate::game::player::{PlayerActors, PlayerId, RosterAccess};
use crate::util::vec2::Vec2;

/// Shared handle to the scene layer's player actors
pub type ActorHandle = Rc<RefCell<dyn PlayerActors>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespawnConfig {
    /// Seconds between death and respawn
    pub delay: f32,
    /// Maximum respawns per player per round (None = unlimited)
    pub max_respawns: Option<u32>,
    /// Invincibility window applied on respawn (seconds)
    pub invincibility: f32,
}

impl Default for RespawnConfig {
    fn default() -> Self {
        Self {
            delay: respawn::DELAY,
            max_respawns: None,
            invincibility: respawn::INVINCIBILITY,
        }
    }
}

/// Topics published by the respawn manager
pub const RESPAWN_TOPICS: &[Topic] = &[
    Topic::PlayerRespawned,
    Topic::RespawnDenied,
    Topic::RespawnTimerUpdated,
];

pub struct RespawnManager {
    bus: Rc<EventBus>,
    endpoint: EndpointId,
    config: RespawnConfig,
    actors: ActorHandle,
    points: Vec<Vec2>,
    active: bool,
    /// Seconds remaining, present only while a player is dead and pending
    countdowns: BTreeMap<PlayerId, f32>,
    respawn_counts: HashMap<PlayerId, u32>,
    blocked: HashSet<PlayerId>,
    rng: StdRng,
}

impl RespawnManager {
    pub fn new(bus: Rc<EventBus>, config: RespawnConfig, actors: ActorHandle, seed: Option<u64>) -> Self {
        let endpoint = bus.register("respawn", RESPAWN_TOPICS);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            bus,
            endpoint,
            config,
            actors,
            points: Vec::new(),
            active: false,
            countdowns: BTreeMap::new(),
            respawn_counts: HashMap::new(),
            blocked: HashSet::new(),
            rng,
        }
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// Prepare for a new round with the arena's respawn markers
    pub fn setup(&mut self, points: &[Vec2]) {
        self.reset();
        self.points = points.to_vec();
        if self.points.is_empty() {
            warn!("No respawn points configured; players will respawn at origin");
        }
    }

    pub fn set_config(&mut self, config: RespawnConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &RespawnConfig {
        &self.config
    }

    /// Start observing deaths
    pub fn start(&mut self) {
        self.active = true;
    }

    /// Stop observing deaths. Pending countdowns are kept.
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Drop pending countdowns
    pub fn clear_timers(&mut self) {
        if !self.countdowns.is_empty() {
            debug!("Cleared {} respawn countdowns", self.countdowns.len());
        }
        self.countdowns.clear();
    }

    /// Clear countdowns, respawn counts and the blocked set
    pub fn reset(&mut self) {
        self.clear_timers();
        self.respawn_counts.clear();
        self.blocked.clear();
    }

    /// Drop a pending countdown for a player who came back some other way
    pub fn cancel(&mut self, id: PlayerId) -> bool {
        if self.countdowns.remove(&id).is_none() {
            return false;
        }
        self.with_actors(|actors| actors.set_renderable(id, true));
        debug!("Respawn countdown cancelled for {}", id);
        true
    }

    pub fn block(&mut self, id: PlayerId) -> bool {
        let added = self.blocked.insert(id);
        if added {
            debug!("Respawn blocked for {}", id);
        }
        added
    }

    pub fn unblock(&mut self, id: PlayerId) -> bool {
        self.blocked.remove(&id)
    }

    pub fn is_blocked(&self, id: PlayerId) -> bool {
        self.blocked.contains(&id)
    }

    pub fn is_pending(&self, id: PlayerId) -> bool {
        self.countdowns.contains_key(&id)
    }

    pub fn seconds_left(&self, id: PlayerId) -> Option<f32> {
        self.countdowns.get(&id).copied()
    }

    pub fn respawn_count(&self, id: PlayerId) -> u32 {
        self.respawn_counts.get(&id).copied().unwrap_or(0)
    }

    pub fn total_respawns(&self) -> u32 {
        self.respawn_counts.values().sum()
    }

    fn deny(&self, id: PlayerId, reason: DenialReason) {
        debug!("Respawn denied for {}: {:?}", id, reason);
        self.bus
            .publish(self.endpoint, GameEvent::RespawnDenied { player: id, reason });
    }

    fn with_actors(&self, f: impl FnOnce(&mut dyn PlayerActors)) {
        match self.actors.try_borrow_mut() {
            Ok(mut actors) => f(&mut *actors),
            Err(_) => warn!("Player actors busy; actor update skipped"),
        }
    }

    /// Schedule a respawn for a dead player. Returns true if a countdown started.
    pub fn handle_player_died(&mut self, id: PlayerId) -> bool {
        if !self.active {
            return false;
        }
        if self.blocked.contains(&id) {
            self.deny(id, DenialReason::Blocked);
            return false;
        }
        if let Some(max) = self.config.max_respawns {
            if self.respawn_count(id) >= max {
                self.deny(id, DenialReason::LimitReached);
                return false;
            }
        }
        if self.countdowns.contains_key(&id) {
            debug!("{} already waiting to respawn", id);
            return false;
        }

        self.countdowns.insert(id, self.config.delay);
        self.with_actors(|actors| actors.set_renderable(id, false));
        debug!("{} respawns in {:.2}s", id, self.config.delay);
        true
    }

    /// Advance every countdown by `dt` and respawn players whose timer ran out.
    /// Returns the players respawned this tick.
    pub fn tick(&mut self, dt: f32, roster: &mut dyn RosterAccess) -> Vec<PlayerId> {
        if !self.active || self.countdowns.is_empty() {
            return Vec::new();
        }

        let orphaned: Vec<PlayerId> = self
            .countdowns
            .keys()
            .copied()
            .filter(|id| roster.record(*id).is_none())
            .collect();
        for id in orphaned {
            self.countdowns.remove(&id);
            self.deny(id, DenialReason::Orphaned);
        }

        let mut due = Vec::new();
        let mut updates = Vec::with_capacity(self.countdowns.len());
        for (id, seconds) in self.countdowns.iter_mut() {
            *seconds -= dt;
            updates.push((*id, seconds.max(0.0)));
            if *seconds <= 0.0 {
                due.push(*id);
            }
        }
        for (player, seconds_left) in updates {
            self.bus.publish(
                self.endpoint,
                GameEvent::RespawnTimerUpdated {
                    player,
                    seconds_left,
                },
            );
        }

        let mut respawned = Vec::with_capacity(due.len());
        for id in due {
            self.countdowns.remove(&id);
            if self.blocked.contains(&id) {
                self.deny(id, DenialReason::Blocked);
                continue;
            }
            if self.respawn_player(id, roster) {
                respawned.push(id);
            }
        }
        respawned
    }

    fn respawn_player(&mut self, id: PlayerId, roster: &mut dyn RosterAccess) -> bool {
        let Some(health) = roster.revive(id).map(|r| r.health()) else {
            self.deny(id, DenialReason::Orphaned);
            return false;
        };

        let position = self.points.choose(&mut self.rng).copied().unwrap_or(Vec2::ZERO);
        let invincibility = self.config.invincibility;
        self.with_actors(|actors| {
            actors.respawn_actor(id, position, invincibility);
            actors.set_renderable(id, true);
        });
        *self.respawn_counts.entry(id).or_insert(0) += 1;

        info!("Respawned {} at {}", id, position);
        self.bus.publish(
            self.endpoint,
            GameEvent::PlayerRespawned {
                player: id,
                position,
                health,
            },
        );
        true
    }

    /// Subscribe `manager` to `player_died` from `source`
    pub fn connect(manager: &Rc<RefCell<Self>>, source: EndpointId) -> SubscriptionId {
        let (bus, endpoint) = {
            let m = manager.borrow();
            (m.bus.clone(), m.endpoint)
        };
        let weak = Rc::downgrade(manager);
        bus.subscribe(source, Topic::PlayerDied, endpoint, move |event| {
            let GameEvent::PlayerDied { player, .. } = event else {
                return;
            };
            let Some(manager) = weak.upgrade() else {
                return;
            };
            match manager.try_borrow_mut() {
                Ok(mut m) => {
                    m.handle_player_died(*player);
                }
                Err(_) => warn!("Respawn manager busy, dropped death of {}", player),
            };
        })
    }
}
