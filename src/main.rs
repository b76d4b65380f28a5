//! Star Rush Game Server
//!
//! Runs the WebSocket authority by default. `star-rush-server demo` plays a
//! scripted local game and verifies it by replay.

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use star_rush::{
    VERSION,
    core::geometry::Point,
    game::{
        config::GameConfig,
        events::GameEventData,
        local::{Clock, LocalGame, ManualClock, SystemClock},
        replay::replay,
        state::{GameState, PlayerId},
    },
    network::{GameServer, ServerConfig},
};

/// Milliseconds between scripted intents in the demo.
const DEMO_STEP_MS: u64 = 100;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Star Rush Server v{}", VERSION);

    match std::env::args().nth(1).as_deref() {
        None | Some("serve") => serve().await,
        Some("demo") => demo(),
        Some(other) => bail!("unknown command {:?} (expected `serve` or `demo`)", other),
    }
}

async fn serve() -> Result<()> {
    let config = ServerConfig::from_env();
    info!(bind = %config.bind_addr, seed = ?config.seed, "Starting server");

    let server = std::sync::Arc::new(GameServer::new(config));
    let running = server.clone();
    let handle = tokio::spawn(async move { running.run().await });

    tokio::select! {
        result = handle => {
            result.context("server task panicked")?.context("server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }
    Ok(())
}

/// Play a whole local game with greedy scripted players.
fn demo() -> Result<()> {
    info!("=== Starting Demo Game ===");

    let config = GameConfig::default().with_env_overrides();
    config.validate().context("invalid game config")?;
    let seed = std::env::var("STAR_RUSH_SEED")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(12345u64);

    let clock = ManualClock::new(SystemClock.now_ms());
    let mut game = LocalGame::new(config, clock.clone());
    let state = game.start(seed).context("could not start game")?;
    info!(seed, obstacles = state.obstacles.len(), powerups = state.powerups.len(), "Layout generated");

    let mut step: u64 = 0;
    let mut total_events = 0;
    while game.state().is_running() {
        clock.advance(DEMO_STEP_MS);
        step += 1;

        for id in PlayerId::ALL {
            let (dx, dy) = steer(game.state(), id, step);
            match game.move_player(u32::from(id.get()), dx, dy) {
                Ok(_) => {}
                Err(e) => {
                    // The countdown may end the game mid-round
                    if game.state().is_running() {
                        warn!(%id, "Move rejected: {}", e);
                    }
                    break;
                }
            }
            total_events += game.last_events().len();
            for event in game.last_events() {
                if let GameEventData::PowerupCollected { player_id, kind, .. } = &event.data {
                    info!("Player {} collected {:?} powerup", player_id, kind);
                }
            }
        }

        if step % 100 == 0 {
            info!(time_remaining = game.state().time_remaining, scores = ?game.state().scores(), "Progress");
        }
    }

    // === Results ===
    let final_state = game.state();
    let hash = final_state.compute_hash();
    info!("=== Game Results ===");
    for (id, score) in final_state.scores() {
        info!("Player {} - Score: {}", id, score);
    }
    match final_state.winner {
        Some(winner) => info!("Winner: Player {}", winner),
        None => info!("No winner"),
    }
    info!("Total events: {}", total_events);
    info!("Final State Hash: {}", hex::encode(hash));

    // === Determinism ===
    let recording = game.recording().context("no recording")?;
    let (replayed, _) = replay(recording).context("replay failed")?;
    let replay_hash = replayed.compute_hash();
    info!("Replay State Hash: {}", hex::encode(replay_hash));

    if hash != replay_hash {
        bail!("determinism failure: replay diverged");
    }
    info!(transitions = recording.len(), "DETERMINISM VERIFIED: Hashes match!");
    Ok(())
}

/// Head for the object; when stuck, sidestep in a direction that rotates
/// with the step count.
fn steer(state: &GameState, id: PlayerId, step: u64) -> (i32, i32) {
    let Some(player) = state.get_player(id) else {
        return (0, 0);
    };
    let target: Point = state.object.position;
    let toward = |from: f64, to: f64| {
        if (to - from).abs() < 1.0 {
            0
        } else if to > from {
            1
        } else {
            -1
        }
    };

    let dx = toward(player.position.x, target.x);
    let dy = toward(player.position.y, target.y);
    if (step + u64::from(id.get())) % 7 == 0 {
        // Periodic sidestep to slide around obstacles
        return [(dy, -dx), (-dy, dx)][(step % 2) as usize];
    }
    (dx, dy)
}
