//! Layout Generation
//!
//! Places obstacles and powerups at game start and relocates the shared
//! object after every score. Every search is rejection sampling bounded by
//! `GameConfig::max_layout_attempts` per placed item.
//!
//! Distances are measured between top-left anchors.

use thiserror::Error;

use crate::core::geometry::{Point, Square};
use crate::core::rng::DeterministicRng;
use crate::game::config::GameConfig;
use crate::game::state::{Obstacle, ObstacleKind, Powerup, PowerupKind};

/// Obstacles keep this many player sizes apart from each other.
pub const OBSTACLE_SPACING: f64 = 2.5;
/// Obstacles keep this many player sizes away from every spawn.
pub const OBSTACLE_SPAWN_CLEARANCE: f64 = 4.0;
/// Obstacles keep this many object sizes away from the object start.
pub const OBSTACLE_OBJECT_CLEARANCE: f64 = 3.0;
/// Powerups keep this many object sizes away from the object.
pub const POWERUP_OBJECT_CLEARANCE: f64 = 5.0;

/// Layout generation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Obstacle sampling ran out of attempts.
    #[error("placed {placed} of {wanted} obstacles before running out of {attempts} attempts")]
    ObstaclesExhausted {
        /// Obstacles placed so far
        placed: usize,
        /// Obstacles requested
        wanted: usize,
        /// Attempt bound
        attempts: u32,
    },

    /// Powerup sampling ran out of attempts.
    #[error("placed {placed} of {wanted} {kind:?} powerups before running out of {attempts} attempts")]
    PowerupsExhausted {
        /// Type being placed
        kind: PowerupKind,
        /// Powerups of this type placed so far
        placed: usize,
        /// Powerups of this type requested
        wanted: usize,
        /// Attempt bound
        attempts: u32,
    },

    /// No free spot found for the shared object.
    #[error("no free position for the shared object within {attempts} attempts")]
    RelocationExhausted {
        /// Attempt bound
        attempts: u32,
    },

    /// Powerup positions are sampled around obstacles, so at least one is needed.
    #[error("cannot place powerups without obstacles")]
    NoObstacles,
}

/// Minimum distance between a powerup of `kind` and any player.
///
/// The two types deliberately use different clearances.
#[inline]
pub fn powerup_player_clearance(kind: PowerupKind, config: &GameConfig) -> f64 {
    match kind {
        PowerupKind::Speed => config.player_size * 7.0,
        PowerupKind::Slow => config.player_size * 3.0,
    }
}

/// Generate the obstacle field.
///
/// Positions are uniform in `[0, canvas - 4 * player)` on both axes.
pub fn generate_obstacles(
    rng: &mut DeterministicRng,
    config: &GameConfig,
    spawns: &[Point],
    object: Point,
) -> Result<Vec<Obstacle>, LayoutError> {
    let wanted = config.obstacle_count;
    let band = config.canvas_size - config.player_size * 4.0;
    let size = config.obstacle_size();
    let min_spacing = config.player_size * OBSTACLE_SPACING;
    let min_spawn = config.player_size * OBSTACLE_SPAWN_CLEARANCE;
    let min_object = config.object_size * OBSTACLE_OBJECT_CLEARANCE;

    let mut obstacles: Vec<Obstacle> = Vec::with_capacity(wanted);

    while obstacles.len() < wanted {
        let position = sample(rng, config.max_layout_attempts, |rng| {
            let x = rng.next_f64(band);
            let y = rng.next_f64(band);
            let candidate = Point::new(x, y);

            let clear = obstacles.iter().all(|o| o.position.distance(candidate) >= min_spacing)
                && spawns.iter().all(|s| s.distance(candidate) >= min_spawn)
                && object.distance(candidate) >= min_object;
            clear.then_some(candidate)
        })
        .ok_or(LayoutError::ObstaclesExhausted {
            placed: obstacles.len(),
            wanted,
            attempts: config.max_layout_attempts,
        })?;

        obstacles.push(Obstacle { position, size, kind: ObstacleKind::Ice });
    }

    Ok(obstacles)
}

/// Generate powerups: `count / 2` speed powerups, then as many slow ones.
///
/// Each candidate is drawn inside `[0, obstacle + size)` of a random
/// obstacle, biasing placement toward the obstacle field.
pub fn generate_powerups(
    rng: &mut DeterministicRng,
    config: &GameConfig,
    obstacles: &[Obstacle],
    spawns: &[Point],
    object: Point,
) -> Result<Vec<Powerup>, LayoutError> {
    let per_type = config.powerup_count / 2;
    if per_type == 0 {
        return Ok(Vec::new());
    }
    if obstacles.is_empty() {
        return Err(LayoutError::NoObstacles);
    }

    let min_object = config.object_size * POWERUP_OBJECT_CLEARANCE;
    let mut powerups: Vec<Powerup> = Vec::with_capacity(per_type * 2);

    for kind in [PowerupKind::Speed, PowerupKind::Slow] {
        let min_player = powerup_player_clearance(kind, config);

        for placed in 0..per_type {
            let position = sample(rng, config.max_layout_attempts, |rng| {
                let anchor = rng.choose(obstacles)?;
                let x = rng.next_f64(anchor.position.x + anchor.size);
                let y = rng.next_f64(anchor.position.y + anchor.size);
                let candidate = Point::new(x, y);
                let footprint = Square::at(candidate, config.powerup_size);

                let clear = spawns.iter().all(|s| s.distance(candidate) >= min_player)
                    && !obstacles.iter().any(|o| o.footprint().overlaps(&footprint))
                    && object.distance(candidate) >= min_object
                    && powerups
                        .iter()
                        .all(|p| p.position.distance(candidate) >= config.powerup_spacing);
                clear.then_some(candidate)
            })
            .ok_or(LayoutError::PowerupsExhausted {
                kind,
                placed,
                wanted: per_type,
                attempts: config.max_layout_attempts,
            })?;

            powerups.push(Powerup { position, kind, active: true });
        }
    }

    Ok(powerups)
}

/// Pick a new spot for the shared object after a score.
///
/// Integer coordinates in `[0, canvas - object)`, clear of every obstacle
/// and every active powerup.
pub fn relocate_object(
    rng: &mut DeterministicRng,
    config: &GameConfig,
    obstacles: &[Obstacle],
    powerups: &[Powerup],
) -> Result<Point, LayoutError> {
    let range = config.canvas_size - config.object_size;

    sample(rng, config.max_layout_attempts, |rng| {
        let x = rng.next_f64(range).floor();
        let y = rng.next_f64(range).floor();
        let footprint = Square::new(x, y, config.object_size);

        let blocked = obstacles.iter().any(|o| o.footprint().overlaps(&footprint))
            || powerups
                .iter()
                .filter(|p| p.active)
                .any(|p| Square::at(p.position, config.powerup_size).overlaps(&footprint));
        (!blocked).then_some(Point::new(x, y))
    })
    .ok_or(LayoutError::RelocationExhausted { attempts: config.max_layout_attempts })
}

/// Run `attempt` until it yields a value or `max_attempts` is spent.
fn sample<T>(
    rng: &mut DeterministicRng,
    max_attempts: u32,
    mut attempt: impl FnMut(&mut DeterministicRng) -> Option<T>,
) -> Option<T> {
    (0..max_attempts).find_map(|_| attempt(rng))
}

// =============================================================================
// TESTS
// =============================================================================
