//! Top-level session state machine
//!
//! The coordinator owns the roster and the round managers, drives phase
//! transitions and turns round outcomes into session progress. It is ticked
//! once per frame; anything that must not run inside the code path that
//! triggered it goes through the deferred queue and runs at the end of the
//! next tick.

use hashbrown::HashMap;
use rand::Rng;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::events::{EndpointId, EventBus, GameEvent, Topic, TransitionFailure};
use crate::game::crown::CrownManager;
use crate::game::match_result::{determine_stats, RoundStats};
use crate::game::player::{PlayerId, PlayerRecord};
use crate::game::respawn::{ActorHandle, RespawnManager};
use crate::game::victory::{Outcome, VictoryConditionManager, VictoryKind};
use crate::session::deferred::{DeferredAction, DeferredQueue};
use crate::session::phase::{PhaseState, SessionPhase};
use crate::session::progress::SessionProgress;
use crate::session::roster::{PlayerRoster, RosterError};
use crate::session::round::{RoundCatalog, RoundContext, RoundLauncher, RoundServices};

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error("Unknown round kind '{0}'")]
    UnknownRound(String),
    #[error("No round selected")]
    NoRoundSelected,
    #[error("No round in progress")]
    NotInRound,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Topics published by the coordinator
pub const SESSION_TOPICS: &[Topic] = &[
    Topic::PhaseChanged,
    Topic::PhaseTransitionCompleted,
    Topic::PhaseTransitionFailed,
    Topic::PlayerJoined,
    Topic::PlayerLeft,
    Topic::PlayerHealthChanged,
    Topic::PlayerLivesChanged,
    Topic::DamageReported,
    Topic::PlayerDied,
    Topic::RoundStarted,
    Topic::RoundEnded,
];

/// Log correlation id: wall clock seconds plus a random suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let suffix: u32 = rand::thread_rng().gen();
        Self(format!("{}-{:08x}", secs, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Working state of the round in progress
struct ActiveRound {
    context: RoundContext,
    elapsed: f32,
    timed_out: bool,
}

pub struct SessionCoordinator {
    id: SessionId,
    config: SessionConfig,
    bus: Rc<EventBus>,
    endpoint: EndpointId,
    phase: PhaseState,
    roster: PlayerRoster,
    catalog: RoundCatalog,
    launchers: HashMap<String, Box<dyn RoundLauncher>>,
    victory: Rc<RefCell<VictoryConditionManager>>,
    respawn: Rc<RefCell<RespawnManager>>,
    crown: Rc<RefCell<CrownManager>>,
    deferred: DeferredQueue,
    progress: SessionProgress,
    selected_round: Option<String>,
    round: Option<ActiveRound>,
    last_stats: Option<RoundStats>,
}

impl SessionCoordinator {
    pub fn new(
        config: SessionConfig,
        catalog: RoundCatalog,
        actors: ActorHandle,
    ) -> Result<Self, SessionError> {
        config.validate().map_err(SessionError::InvalidConfig)?;

        let id = SessionId::generate();
        let bus = Rc::new(EventBus::new());
        let endpoint = bus.register("session", SESSION_TOPICS);

        let victory = Rc::new(RefCell::new(VictoryConditionManager::new(bus.clone())));
        victory.borrow_mut().set_target_score(config.target_score);
        let respawn = Rc::new(RefCell::new(RespawnManager::new(
            bus.clone(),
            config.respawn_config(),
            actors,
            config.rng_seed,
        )));
        let crown = Rc::new(RefCell::new(CrownManager::new(
            bus.clone(),
            config.crown_config(),
            config.rng_seed.map(|seed| seed.wrapping_add(1)),
        )));

        // Victory sees a death before respawn does, so an eliminated player
        // is already out when the respawn manager checks the blocked set.
        VictoryConditionManager::connect(&victory, endpoint);
        RespawnManager::connect(&respawn, endpoint);

        let deferred = DeferredQueue::new();
        let queue = deferred.clone();
        let victory_endpoint = victory.borrow().endpoint();
        bus.subscribe(victory_endpoint, Topic::VictoryAchieved, endpoint, move |_| {
            queue.push(DeferredAction::FinishRound)
        });

        info!(
            "[{}] Session created: max_players={}, rounds_to_win={}, {} round kinds",
            id,
            config.max_players,
            config.rounds_to_win,
            catalog.len()
        );

        Ok(Self {
            id,
            roster: PlayerRoster::new(config.max_players),
            config,
            bus,
            endpoint,
            phase: PhaseState::new(),
            catalog,
            launchers: HashMap::new(),
            victory,
            respawn,
            crown,
            deferred,
            progress: SessionProgress::new(),
            selected_round: None,
            round: None,
            last_stats: None,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.current
    }

    pub fn phase_state(&self) -> &PhaseState {
        &self.phase
    }

    pub fn roster(&self) -> &PlayerRoster {
        &self.roster
    }

    pub fn player(&self, id: PlayerId) -> Result<&PlayerRecord, SessionError> {
        Ok(self.roster.get(id)?)
    }

    pub fn catalog(&self) -> &RoundCatalog {
        &self.catalog
    }

    pub fn progress(&self) -> &SessionProgress {
        &self.progress
    }

    pub fn victory(&self) -> &Rc<RefCell<VictoryConditionManager>> {
        &self.victory
    }

    pub fn respawn(&self) -> &Rc<RefCell<RespawnManager>> {
        &self.respawn
    }

    pub fn crown(&self) -> &Rc<RefCell<CrownManager>> {
        &self.crown
    }

    /// Kind of the round in progress (also while paused)
    pub fn active_round(&self) -> Option<&str> {
        self.round.as_ref().map(|r| r.context.kind())
    }

    pub fn round_context(&self) -> Option<&RoundContext> {
        self.round.as_ref().map(|r| &r.context)
    }

    /// Seconds the active round has been ticked
    pub fn round_elapsed(&self) -> Option<f32> {
        self.round.as_ref().map(|r| r.elapsed)
    }

    pub fn last_round_stats(&self) -> Option<&RoundStats> {
        self.last_stats.as_ref()
    }

    pub fn pending_actions(&self) -> usize {
        self.deferred.len()
    }

    pub fn register_launcher(&mut self, kind: impl Into<String>, launcher: Box<dyn RoundLauncher>) {
        let kind = kind.into();
        if self.catalog.get(&kind).is_none() {
            warn!("[{}] Launcher registered for unknown round '{}'", self.id, kind);
        }
        self.launchers.insert(kind, launcher);
    }

    fn publish(&self, event: GameEvent) {
        self.bus.publish(self.endpoint, event);
    }

    fn services(&self) -> RoundServices {
        RoundServices {
            bus: self.bus.clone(),
            victory: self.victory.clone(),
            respawn: self.respawn.clone(),
            crown: self.crown.clone(),
        }
    }

    // ========================================================================
    // Phase machine
    // ========================================================================

    /// Move to `target` if the transition table allows it. Returns true if
    /// the phase changed.
    pub fn request_transition(&mut self, target: SessionPhase) -> bool {
        let current = self.phase.current;
        if target == current {
            debug!("[{}] Already in {}", self.id, target);
            return false;
        }
        if !current.can_transition_to(target) {
            warn!("[{}] Illegal transition {} -> {}", self.id, current, target);
            self.publish(GameEvent::PhaseTransitionFailed {
                from: current,
                to: target,
                reason: TransitionFailure::NotAllowed,
            });
            return false;
        }

        self.exit_phase(current, target);
        self.phase.advance(target);
        info!("[{}] Phase {} -> {}", self.id, current, target);
        self.enter_phase(target, current);

        self.publish(GameEvent::PhaseChanged {
            from: current,
            to: target,
        });
        self.deferred
            .push(DeferredAction::CompletePhaseTransition(target));
        true
    }

    fn exit_phase(&mut self, from: SessionPhase, to: SessionPhase) {
        match (from, to) {
            (SessionPhase::Round, SessionPhase::Paused) => {
                debug!("[{}] Round paused", self.id);
            }
            (SessionPhase::Paused, SessionPhase::Round) => {}
            (SessionPhase::Round | SessionPhase::Paused, _) => {
                self.close_round(None);
            }
            _ => {}
        }
    }

    fn enter_phase(&mut self, to: SessionPhase, from: SessionPhase) {
        match to {
            SessionPhase::Round => {
                if from == SessionPhase::Paused && self.round.is_some() {
                    debug!("[{}] Round resumed", self.id);
                    return;
                }
                if let Err(e) = self.launch_round() {
                    warn!("[{}] {}, falling back to MapView", self.id, e);
                    self.deferred
                        .push(DeferredAction::Transition(SessionPhase::MapView));
                }
            }
            SessionPhase::Menu if from == SessionPhase::Ended => {
                info!("[{}] Progress reset for a new session", self.id);
                self.progress.reset();
                self.last_stats = None;
            }
            SessionPhase::Ended => {
                info!(
                    "[{}] Session ended after {} rounds",
                    self.id,
                    self.progress.completed().len()
                );
            }
            _ => {}
        }
    }

    // ========================================================================
    // Rounds
    // ========================================================================

    /// Select `kind` and enter the Round phase. Returns true if the phase
    /// changed; unknown kinds still enter Round and fall back to MapView on
    /// the next tick.
    pub fn start_round(&mut self, kind: &str) -> bool {
        if let Some(active) = self.active_round() {
            warn!("[{}] start_round('{}') rejected: '{}' in progress", self.id, kind, active);
            return false;
        }
        self.selected_round = Some(kind.to_string());
        let entered = self.request_transition(SessionPhase::Round);
        if !entered {
            self.selected_round = None;
        }
        entered
    }

    fn launch_round(&mut self) -> Result<(), SessionError> {
        let kind = self
            .selected_round
            .take()
            .ok_or(SessionError::NoRoundSelected)?;
        let spec = self
            .catalog
            .get(&kind)
            .cloned()
            .ok_or(SessionError::UnknownRound(kind))?;

        let lives = spec.lives.unwrap_or(self.config.starting_lives);
        self.roster.reset_for_round(self.config.max_health, lives);
        let context = RoundContext::new(
            spec,
            self.roster.iter().cloned().collect(),
            self.progress.snapshot(),
        );
        let players = context.player_ids();
        let spec = context.spec();

        {
            let mut victory = self.victory.borrow_mut();
            victory.clear_custom_rule();
            victory.setup(&players, spec.victory, spec.team_mode);
            victory.set_target_score(spec.target_score.unwrap_or(self.config.target_score));
            victory.start_tracking();
        }
        {
            let mut respawn = self.respawn.borrow_mut();
            respawn.setup(&spec.respawn_points);
            let mut config = self.config.respawn_config();
            if spec.max_respawns.is_some() {
                config.max_respawns = spec.max_respawns;
            }
            respawn.set_config(config);
            if spec.respawn_enabled {
                respawn.start();
            } else {
                respawn.stop();
            }
        }
        {
            let mut crown = self.crown.borrow_mut();
            crown.setup(self.victory.clone());
            crown.start();
        }

        for record in context.players() {
            self.publish(GameEvent::PlayerHealthChanged {
                player: record.id,
                health: record.health(),
                max_health: record.max_health(),
            });
            self.publish(GameEvent::PlayerLivesChanged {
                player: record.id,
                lives: record.lives,
            });
        }

        let kind = context.kind().to_string();
        info!(
            "[{}] Round '{}' started ({:?}, {} players)",
            self.id,
            kind,
            spec.victory,
            players.len()
        );
        self.round = Some(ActiveRound {
            context,
            elapsed: 0.0,
            timed_out: false,
        });
        self.publish(GameEvent::RoundStarted { kind: kind.clone() });

        let services = self.services();
        match (self.round.as_ref(), self.launchers.get_mut(&kind)) {
            (Some(round), Some(launcher)) => launcher.launch(&round.context, services),
            _ => debug!("[{}] No launcher for '{}', running headless", self.id, kind),
        }
        Ok(())
    }

    /// Tear the active round down and publish `round_ended`
    fn close_round(&mut self, outcome: Option<Outcome>) -> Option<RoundStats> {
        let round = self.round.take()?;

        self.victory.borrow_mut().stop_tracking();
        {
            let mut respawn = self.respawn.borrow_mut();
            respawn.stop();
            respawn.clear_timers();
        }
        {
            let mut crown = self.crown.borrow_mut();
            crown.remove();
            crown.stop();
        }

        let stats = determine_stats(
            self.victory.borrow().model(),
            &self.roster,
            &*self.respawn.borrow(),
            round.elapsed,
        );
        let kind = round.context.kind().to_string();
        match outcome {
            Some(outcome) => info!("[{}] Round '{}' ended: {:?}", self.id, kind, outcome),
            None => info!("[{}] Round '{}' aborted", self.id, kind),
        }

        self.publish(GameEvent::RoundEnded {
            kind: kind.clone(),
            outcome,
            stats: stats.clone(),
        });
        if let Some(launcher) = self.launchers.get_mut(&kind) {
            launcher.on_round_end(&round.context, outcome);
        }
        self.last_stats = Some(stats.clone());
        Some(stats)
    }

    /// End the active round with its victory result, deciding by standings if
    /// nothing was decided yet. Moves to Ended once a player has enough round
    /// wins, otherwise back to MapView.
    pub fn finish_round(&mut self) -> Result<Outcome, SessionError> {
        let kind = match self.round.as_ref() {
            Some(round) => round.context.kind().to_string(),
            None => return Err(SessionError::NotInRound),
        };

        let decided = self.victory.borrow().result().map(|r| r.outcome);
        let outcome = match decided {
            Some(outcome) => outcome,
            None => {
                let result = self.victory.borrow_mut().finalize_by_time();
                result.map(|r| r.outcome).unwrap_or(Outcome::Draw)
            }
        };

        let winners = self
            .progress
            .record(&kind, outcome, self.victory.borrow().model());
        debug!("[{}] Round '{}' credited to {:?}", self.id, kind, winners);
        self.close_round(Some(outcome));

        let next = match self.progress.champion(self.config.rounds_to_win) {
            Some(champion) => {
                info!("[{}] {} wins the session", self.id, champion);
                SessionPhase::Ended
            }
            None => SessionPhase::MapView,
        };
        if self.phase.current == SessionPhase::Paused {
            self.request_transition(SessionPhase::MapView);
        }
        self.request_transition(next);
        Ok(outcome)
    }

    /// End the active round without a winner and return to MapView
    pub fn abort_round(&mut self) -> Result<RoundStats, SessionError> {
        let stats = self.close_round(None).ok_or(SessionError::NotInRound)?;
        self.request_transition(SessionPhase::MapView);
        Ok(stats)
    }

    // ========================================================================
    // Players
    // ========================================================================

    pub fn add_player(&mut self, id: PlayerId, name: &str) -> bool {
        if let Err(e) = self.roster.add(id, name.to_string()) {
            warn!("[{}] add_player rejected: {}", self.id, e);
            return false;
        }
        info!("[{}] {} '{}' joined ({}/{})", self.id, id, name, self.roster.len(), self.roster.capacity());
        self.publish(GameEvent::PlayerJoined {
            player: id,
            name: name.to_string(),
        });
        true
    }

    /// Remove a player. Mid-round they are eliminated and any pending
    /// respawn is orphaned.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        if let Err(e) = self.roster.remove(id) {
            warn!("[{}] remove_player rejected: {}", self.id, e);
            return false;
        }
        info!("[{}] {} left", self.id, id);
        if self.round.is_some() {
            self.victory.borrow_mut().eliminate(id);
        }
        self.publish(GameEvent::PlayerLeft { player: id });
        true
    }

    /// Set a player's health (clamped). Falling to zero counts as a death.
    pub fn update_player_health(&mut self, id: PlayerId, new_health: i32) -> bool {
        let change = match self.roster.set_health(id, new_health) {
            Ok(change) => change,
            Err(e) => {
                warn!("[{}] update_player_health rejected: {}", self.id, e);
                return false;
            }
        };
        if change.changed() {
            self.publish(GameEvent::PlayerHealthChanged {
                player: id,
                health: change.new,
                max_health: change.max,
            });
        }
        if change.died() {
            self.on_player_died(id);
        } else if change.old == 0 && change.new > 0 && self.respawn.borrow_mut().cancel(id) {
            debug!("[{}] {} healed while pending, respawn cancelled", self.id, id);
        }
        true
    }

    /// Report damage from round content and apply it
    pub fn report_damage(&mut self, id: PlayerId, amount: i32, source: Option<PlayerId>) -> bool {
        let health = match self.roster.get(id) {
            Ok(record) if record.is_alive() => record.health(),
            Ok(_) => {
                debug!("[{}] Damage to dead {} ignored", self.id, id);
                return false;
            }
            Err(e) => {
                warn!("[{}] report_damage rejected: {}", self.id, e);
                return false;
            }
        };
        self.publish(GameEvent::DamageReported {
            player: id,
            amount,
            attacker: source,
        });
        self.update_player_health(id, health.saturating_sub(amount))
    }

    fn on_player_died(&mut self, id: PlayerId) {
        let Some(round) = self.round.as_ref() else {
            let lives_remaining = self.roster.get(id).map(|r| r.lives).unwrap_or(0);
            debug!("[{}] {} died outside a round", self.id, id);
            self.publish(GameEvent::PlayerDied {
                player: id,
                lives_remaining,
            });
            return;
        };
        if !round.context.contains(id) {
            debug!("[{}] {} joined mid-round, death ignored", self.id, id);
            return;
        }
        let spec = round.context.spec();
        let out_on_last_life =
            spec.eliminate_on_last_life || spec.victory == VictoryKind::Elimination;

        let lives = match self.roster.lose_life(id) {
            Ok(lives) => lives,
            Err(e) => {
                warn!("[{}] Death of {} ignored: {}", self.id, id, e);
                return;
            }
        };
        self.publish(GameEvent::PlayerLivesChanged { player: id, lives });
        let already_out = self
            .victory
            .try_borrow()
            .is_ok_and(|v| v.model().is_eliminated(id));
        if already_out || (lives == 0 && out_on_last_life) {
            self.respawn.borrow_mut().block(id);
        }
        info!("[{}] {} died, {} lives left", self.id, id, lives);
        self.publish(GameEvent::PlayerDied {
            player: id,
            lives_remaining: lives,
        });
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance the session by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        if self.phase.current == SessionPhase::Round {
            self.tick_round(dt);
        }
        self.drain_deferred();
    }

    fn tick_round(&mut self, dt: f32) {
        let Some(round) = self.round.as_mut() else {
            return;
        };
        round.elapsed += dt;
        let expired = !round.timed_out
            && round
                .context
                .spec()
                .time_limit
                .is_some_and(|limit| round.elapsed >= limit);
        if expired {
            round.timed_out = true;
            info!("[{}] Round time limit reached", self.id);
            let decided = self.victory.borrow().result().is_some();
            if !decided {
                self.victory.borrow_mut().finalize_by_time();
            }
        }

        self.respawn.borrow_mut().tick(dt, &mut self.roster);
        self.crown.borrow_mut().tick(dt, &self.roster);
    }

    fn drain_deferred(&mut self) {
        for action in self.deferred.take() {
            match action {
                DeferredAction::CompletePhaseTransition(phase) => {
                    if self.phase.current == phase {
                        self.publish(GameEvent::PhaseTransitionCompleted { phase });
                    } else {
                        debug!(
                            "[{}] Transition to {} superseded by {}",
                            self.id, phase, self.phase.current
                        );
                    }
                }
                DeferredAction::FinishRound => {
                    if self.round.is_some() {
                        if let Err(e) = self.finish_round() {
                            warn!("[{}] Deferred finish failed: {}", self.id, e);
                        }
                    }
                }
                DeferredAction::Transition(target) => {
                    self.request_transition(target);
                }
            }
        }
    }

    /// Close any round and detach the session's endpoints from the bus
    pub fn shutdown(&mut self) {
        self.close_round(None);
        self.deferred.clear();

        let endpoints = [
            self.endpoint,
            self.victory.borrow().endpoint(),
            self.respawn.borrow().endpoint(),
            self.crown.borrow().endpoint(),
        ];
        let unsubscribed: usize = endpoints
            .iter()
            .map(|e| self.bus.unsubscribe_all_for(*e))
            .sum();
        for endpoint in endpoints {
            self.bus.retire(endpoint);
        }
        let stale = self.bus.cleanup_stale();
        info!(
            "[{}] Shut down ({} subscriptions removed, {} stale)",
            self.id, unsubscribed, stale
        );
    }
}
