//! Round definitions, per-round context and the launcher seam

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::{info, warn};

use crate::events::EventBus;
use crate::game::crown::CrownManager;
use crate::game::player::{PlayerId, PlayerRecord};
use crate::game::respawn::RespawnManager;
use crate::game::victory::{Outcome, VictoryConditionManager, VictoryKind};
use crate::session::progress::ProgressSnapshot;
use crate::util::vec2::Vec2;

/// Catalog loading errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read round catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse round catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid round catalog: {0}")]
    Invalid(String),
}

/// Rules for one round kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundSpec {
    /// Key the launcher is registered under
    pub kind: String,
    pub victory: VictoryKind,
    pub team_mode: bool,
    /// Overrides the session target score for Score rounds
    pub target_score: Option<i32>,
    /// Seconds until the round is decided by standings
    pub time_limit: Option<f32>,
    /// Overrides the session starting lives
    pub lives: Option<u32>,
    pub respawn_enabled: bool,
    /// Block respawn once a player's lives reach zero
    pub eliminate_on_last_life: bool,
    /// Overrides the session respawn ceiling
    pub max_respawns: Option<u32>,
    pub respawn_points: Vec<Vec2>,
}

impl Default for RoundSpec {
    fn default() -> Self {
        Self {
            kind: String::new(),
            victory: VictoryKind::Elimination,
            team_mode: false,
            target_score: None,
            time_limit: None,
            lives: None,
            respawn_enabled: true,
            eliminate_on_last_life: false,
            max_respawns: None,
            respawn_points: Vec::new(),
        }
    }
}

fn corners(extent: f32) -> Vec<Vec2> {
    vec![
        Vec2::new(-extent, -extent),
        Vec2::new(extent, -extent),
        Vec2::new(-extent, extent),
        Vec2::new(extent, extent),
    ]
}

/// All round kinds the session can launch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundCatalog {
    rounds: Vec<RoundSpec>,
}

impl RoundCatalog {
    pub fn new(rounds: Vec<RoundSpec>) -> Result<Self, CatalogError> {
        let catalog = Self { rounds };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Rounds shipped with the crate
    pub fn builtin() -> Self {
        Self {
            rounds: vec![
                RoundSpec {
                    kind: "last_stand".to_string(),
                    victory: VictoryKind::Elimination,
                    lives: Some(3),
                    eliminate_on_last_life: true,
                    respawn_points: corners(200.0),
                    ..Default::default()
                },
                RoundSpec {
                    kind: "score_rush".to_string(),
                    victory: VictoryKind::Score,
                    target_score: Some(10),
                    time_limit: Some(90.0),
                    respawn_points: corners(150.0),
                    ..Default::default()
                },
                RoundSpec {
                    kind: "king_of_the_hill".to_string(),
                    victory: VictoryKind::TimeLimit,
                    time_limit: Some(60.0),
                    respawn_points: corners(100.0),
                    ..Default::default()
                },
                RoundSpec {
                    kind: "sumo".to_string(),
                    victory: VictoryKind::Elimination,
                    lives: Some(1),
                    respawn_enabled: false,
                    eliminate_on_last_life: true,
                    respawn_points: corners(80.0),
                    ..Default::default()
                },
                RoundSpec {
                    kind: "team_brawl".to_string(),
                    victory: VictoryKind::Elimination,
                    team_mode: true,
                    lives: Some(2),
                    eliminate_on_last_life: true,
                    max_respawns: Some(1),
                    respawn_points: corners(250.0),
                    ..Default::default()
                },
            ],
        }
    }

    /// Read a JSON array of round specs
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let rounds: Vec<RoundSpec> = serde_json::from_str(&raw)?;
        Self::new(rounds)
    }

    /// Load from `path` if given, falling back to the built-in catalog
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };
        match Self::load(path) {
            Ok(catalog) => {
                info!("Loaded {} rounds from {}", catalog.len(), path.display());
                catalog
            }
            Err(e) => {
                warn!("{} ({}), using built-in rounds", e, path.display());
                Self::builtin()
            }
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.rounds.is_empty() {
            return Err(CatalogError::Invalid("no rounds defined".to_string()));
        }
        for (i, spec) in self.rounds.iter().enumerate() {
            if spec.kind.is_empty() {
                return Err(CatalogError::Invalid(format!("round #{} has no kind", i)));
            }
            if self.rounds[..i].iter().any(|r| r.kind == spec.kind) {
                return Err(CatalogError::Invalid(format!("duplicate kind '{}'", spec.kind)));
            }
            if spec.lives == Some(0) {
                return Err(CatalogError::Invalid(format!("'{}': lives must be >= 1", spec.kind)));
            }
            if matches!(spec.time_limit, Some(t) if !(t > 0.0)) {
                return Err(CatalogError::Invalid(format!(
                    "'{}': time_limit must be > 0",
                    spec.kind
                )));
            }
            if matches!(spec.target_score, Some(s) if s <= 0) {
                return Err(CatalogError::Invalid(format!(
                    "'{}': target_score must be > 0",
                    spec.kind
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&RoundSpec> {
        self.rounds.iter().find(|r| r.kind == kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.rounds.iter().map(|r| r.kind.as_str())
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}

impl Default for RoundCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Immutable view of a round, built once when the round starts
#[derive(Debug, Clone)]
pub struct RoundContext {
    spec: RoundSpec,
    players: Vec<PlayerRecord>,
    progress: ProgressSnapshot,
}

impl RoundContext {
    pub fn new(spec: RoundSpec, players: Vec<PlayerRecord>, progress: ProgressSnapshot) -> Self {
        Self {
            spec,
            players,
            progress,
        }
    }

    pub fn kind(&self) -> &str {
        &self.spec.kind
    }

    pub fn spec(&self) -> &RoundSpec {
        &self.spec
    }

    /// Player records as they were at round start
    pub fn players(&self) -> &[PlayerRecord] {
        &self.players
    }

    /// Whether `id` was in the roster when the round started
    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn progress(&self) -> &ProgressSnapshot {
        &self.progress
    }
}

/// Handles given to round content when it launches
#[derive(Clone)]
pub struct RoundServices {
    pub bus: Rc<EventBus>,
    pub victory: Rc<RefCell<VictoryConditionManager>>,
    pub respawn: Rc<RefCell<RespawnManager>>,
    pub crown: Rc<RefCell<CrownManager>>,
}

/// Round content for one round kind
pub trait RoundLauncher {
    /// Called once when the round starts, after the managers are set up
    fn launch(&mut self, context: &RoundContext, services: RoundServices);

    /// Called when the round ends. `outcome` is None for aborted rounds.
    fn on_round_end(&mut self, _context: &RoundContext, _outcome: Option<Outcome>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = RoundCatalog::builtin();
        assert!(catalog.validate().is_ok());
        assert!(catalog.get("last_stand").is_some());
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_parse_with_defaults() {
        let raw = r#"[{"kind": "duel", "victory": "score", "target_score": 3}]"#;
        let rounds: Vec<RoundSpec> = serde_json::from_str(raw).unwrap();
        let catalog = RoundCatalog::new(rounds).unwrap();

        let duel = catalog.get("duel").unwrap();
        assert_eq!(duel.victory, VictoryKind::Score);
        assert_eq!(duel.target_score, Some(3));
        assert!(duel.respawn_enabled);
        assert!(duel.respawn_points.is_empty());
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let spec = RoundSpec {
            kind: "a".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            RoundCatalog::new(vec![spec.clone(), spec]),
            Err(CatalogError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_lives_rejected() {
        let spec = RoundSpec {
            kind: "a".to_string(),
            lives: Some(0),
            ..Default::default()
        };
        assert!(RoundCatalog::new(vec![spec]).is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let catalog = RoundCatalog::load_or_default(Some(Path::new("/nonexistent/rounds.json")));
        assert_eq!(catalog, RoundCatalog::builtin());
    }
}
