use std::path::PathBuf;
use std::str::FromStr;

use crate::game::constants::{crown, health, lives, respawn, session, victory};
use crate::game::crown::{CrownConfig, TieBreak};
use crate::game::respawn::RespawnConfig;

/// Session configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Maximum players in the roster
    pub max_players: usize,
    /// Health every player starts a round with
    pub max_health: i32,
    /// Lives per round unless the round overrides it
    pub starting_lives: u32,
    /// Seconds between death and respawn
    pub respawn_delay: f32,
    /// Respawn ceiling per player per round (None = unlimited)
    pub max_respawns: Option<u32>,
    /// Invincibility window after respawn (seconds)
    pub invincibility: f32,
    /// Seconds between crown polls
    pub crown_poll_interval: f32,
    pub crown_tie_break: TieBreak,
    /// Ticks per second for the session driver
    pub tick_rate: u32,
    /// Round wins that end the session
    pub rounds_to_win: u32,
    /// Score target unless the round overrides it
    pub target_score: i32,
    /// Seed for respawn point and crown tie-break choices (None = entropy)
    pub rng_seed: Option<u64>,
    /// JSON round catalog (None = built-in rounds)
    pub round_catalog: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: session::MAX_PLAYERS,
            max_health: health::MAX,
            starting_lives: lives::STARTING,
            respawn_delay: respawn::DELAY,
            max_respawns: None,
            invincibility: respawn::INVINCIBILITY,
            crown_poll_interval: crown::POLL_INTERVAL,
            crown_tie_break: TieBreak::default(),
            tick_rate: session::TICK_RATE,
            rounds_to_win: session::ROUNDS_TO_WIN,
            target_score: victory::TARGET_SCORE,
            rng_seed: None,
            round_catalog: None,
        }
    }
}

/// Parse `name` from the environment if set. Unparseable or out-of-range
/// values log a warning and yield None.
fn env_value<T: FromStr>(name: &str, valid: impl Fn(&T) -> bool, range: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(parsed) if valid(&parsed) => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", name, range);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

impl SessionConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_value("MAX_PLAYERS", |v: &usize| (1..=64).contains(v), "1-64") {
            config.max_players = v;
        }
        if let Some(v) = env_value("MAX_HEALTH", |v: &i32| *v > 0, "> 0") {
            config.max_health = v;
        }
        if let Some(v) = env_value("STARTING_LIVES", |v: &u32| *v > 0, "> 0") {
            config.starting_lives = v;
        }
        if let Some(v) = env_value("RESPAWN_DELAY", |v: &f32| *v >= 0.0, ">= 0") {
            config.respawn_delay = v;
        }
        if let Some(v) = env_value("MAX_RESPAWNS", |_: &u32| true, "a number") {
            config.max_respawns = Some(v);
        }
        if let Some(v) = env_value("CROWN_POLL_INTERVAL", |v: &f32| *v > 0.0, "> 0") {
            config.crown_poll_interval = v;
        }
        if let Ok(raw) = std::env::var("CROWN_TIE_BREAK") {
            match raw.parse::<TieBreak>() {
                Ok(tie_break) => config.crown_tie_break = tie_break,
                Err(e) => tracing::warn!("Invalid CROWN_TIE_BREAK: {}, using default", e),
            }
        }
        if let Some(v) = env_value("TICK_RATE", |v: &u32| (1..=240).contains(v), "1-240") {
            config.tick_rate = v;
        }
        if let Some(v) = env_value("ROUNDS_TO_WIN", |v: &u32| *v > 0, "> 0") {
            config.rounds_to_win = v;
        }
        if let Some(v) = env_value("RNG_SEED", |_: &u64| true, "a number") {
            config.rng_seed = Some(v);
        }
        if let Ok(path) = std::env::var("ROUND_CATALOG") {
            config.round_catalog = Some(PathBuf::from(path));
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.max_players == 0 {
            return Err("max_players must be at least 1".to_string());
        }
        if self.max_health <= 0 {
            return Err("max_health must be positive".to_string());
        }
        if self.starting_lives == 0 {
            return Err("starting_lives must be at least 1".to_string());
        }
        if !(self.respawn_delay >= 0.0) {
            return Err("respawn_delay cannot be negative".to_string());
        }
        if !(self.crown_poll_interval > 0.0) {
            return Err("crown_poll_interval must be positive".to_string());
        }
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.rounds_to_win == 0 {
            return Err("rounds_to_win must be at least 1".to_string());
        }
        if self.target_score <= 0 {
            return Err("target_score must be positive".to_string());
        }
        Ok(())
    }

    /// Seconds per tick
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    pub fn respawn_config(&self) -> RespawnConfig {
        RespawnConfig {
            delay: self.respawn_delay,
            max_respawns: self.max_respawns,
            invincibility: self.invincibility,
        }
    }

    pub fn crown_config(&self) -> CrownConfig {
        CrownConfig {
            poll_interval: self.crown_poll_interval,
            tie_break: self.crown_tie_break,
        }
    }
}
