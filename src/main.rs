use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use party_session::config::SessionConfig;
use party_session::events::{EndpointId, EventBus, Topic};
use party_session::game::crown::CROWN_TOPICS;
use party_session::game::player::{PlayerActors, PlayerId};
use party_session::game::respawn::RESPAWN_TOPICS;
use party_session::game::victory::{VictoryKind, VICTORY_TOPICS};
use party_session::session::{RoundCatalog, SessionCoordinator, SessionPhase, SESSION_TOPICS};
use party_session::util::vec2::Vec2;

/// Safety cap on simulated time (seconds)
const MAX_SIMULATED_SECONDS: f32 = 1800.0;

/// Actor layer for the headless driver: only logs what it is asked to do
struct LoggingActors;

impl PlayerActors for LoggingActors {
    fn set_renderable(&mut self, id: PlayerId, renderable: bool) {
        debug!("actor {} renderable={}", id, renderable);
    }

    fn respawn_actor(&mut self, id: PlayerId, position: Vec2, invincible_for: f32) {
        debug!("actor {} moved to {} (invincible {:.1}s)", id, position, invincible_for);
    }
}

/// Log every event a source publishes as one JSON line
fn log_events(bus: &EventBus, source: EndpointId, topics: &[Topic]) {
    let observer = bus.register("event-log", &[]);
    for topic in topics {
        bus.subscribe(source, *topic, observer, |event| {
            match serde_json::to_string(event) {
                Ok(json) => info!(target: "events", "{}", json),
                Err(e) => warn!("Failed to serialize {}: {}", event.topic(), e),
            }
        });
    }
}

/// Inject damage and score the way round content would
fn simulate_round(session: &mut SessionCoordinator, rng: &mut StdRng) {
    let alive: Vec<PlayerId> = session
        .roster()
        .iter()
        .filter(|p| p.is_alive())
        .map(|p| p.id)
        .collect();
    if alive.is_empty() {
        return;
    }

    if rng.gen_bool(0.04) {
        if let Some(&victim) = alive.choose(rng) {
            let attacker = alive.iter().copied().filter(|id| *id != victim).collect::<Vec<_>>();
            let attacker = attacker.choose(rng).copied();
            session.report_damage(victim, rng.gen_range(10..40), attacker);
        }
    }

    let scoring = session
        .round_context()
        .map(|c| matches!(c.spec().victory, VictoryKind::Score | VictoryKind::TimeLimit))
        .unwrap_or(false);
    if scoring && rng.gen_bool(0.03) {
        if let Some(&scorer) = alive.choose(rng) {
            session.victory().borrow_mut().add_score(scorer, 1);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Party Session v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = SessionConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    let catalog = RoundCatalog::load_or_default(config.round_catalog.as_deref());
    info!(
        "Configuration loaded: {} players, {} Hz, {} rounds to win",
        config.max_players, config.tick_rate, config.rounds_to_win
    );

    // Speed up the wall clock for demos (DEMO_TIME_SCALE=10 runs 10x faster)
    let time_scale: f32 = std::env::var("DEMO_TIME_SCALE")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|s: &f32| *s > 0.0)
        .unwrap_or(1.0);

    let mut rng = match config.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let dt = config.dt();
    let kinds: Vec<String> = catalog.kinds().map(str::to_string).collect();

    let mut session = SessionCoordinator::new(config.clone(), catalog, Rc::new(RefCell::new(LoggingActors)))?;
    {
        let bus = session.bus().clone();
        log_events(&bus, session.endpoint(), SESSION_TOPICS);
        log_events(&bus, session.victory().borrow().endpoint(), VICTORY_TOPICS);
        log_events(&bus, session.respawn().borrow().endpoint(), RESPAWN_TOPICS);
        log_events(&bus, session.crown().borrow().endpoint(), CROWN_TOPICS);
    }

    for i in 0..config.max_players as u32 {
        session.add_player(PlayerId(i), &format!("Player{}", i));
    }
    session.request_transition(SessionPhase::Menu);
    session.request_transition(SessionPhase::MapView);

    let mut ticker = interval(Duration::from_secs_f32(dt / time_scale));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Session {} running at {} Hz (x{:.1})", session.id(), config.tick_rate, time_scale);

    let mut next_round = 0usize;
    let mut simulated = 0.0f32;
    let run = async {
        loop {
            ticker.tick().await;

            match session.phase() {
                SessionPhase::MapView if session.pending_actions() == 0 => {
                    let kind = &kinds[next_round % kinds.len()];
                    next_round += 1;
                    session.start_round(kind);
                }
                SessionPhase::Round => simulate_round(&mut session, &mut rng),
                SessionPhase::Ended => break,
                _ => {}
            }

            session.tick(dt);
            simulated += dt;
            if simulated >= MAX_SIMULATED_SECONDS {
                warn!("Simulation cap reached after {:.0}s", simulated);
                break;
            }
        }
    };

    // Shutdown signal handler
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    tokio::select! {
        _ = run => {}
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    // Cleanup
    for record in session.roster().iter() {
        info!(
            "{} ({}): {} round wins",
            record.id,
            record.name,
            session.progress().wins(record.id)
        );
    }
    if let Some(stats) = session.last_round_stats() {
        info!("Last round: {}", serde_json::to_string(stats)?);
    }
    session.shutdown();
    session.bus().force_cleanup_all();
    info!("Session stopped");

    Ok(())
}
